//! Configuration types for grand-ambassador.
//!
//! Settings come from defaults, an optional YAML file, and command-line
//! overrides, in that order.

mod daemon;
mod reconcile;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use daemon::{DaemonAddress, DaemonConfig, TlsConfig, DEFAULT_DAEMON_HOST};
pub use reconcile::{AdminConfig, ReconcileConfig, WaitPolicy};

use crate::controller::WatchSet;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Workload names to ambassadorize
    #[serde(default)]
    pub watch: Vec<String>,

    /// Address proxy listeners bind to
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

fn default_listen_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            watch: Vec::new(),
            listen_address: default_listen_address(),
            reconcile: ReconcileConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Command-line values layered over the file configuration.
///
/// `None`/empty fields leave the file value untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub names: Vec<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_ca: Option<String>,
    pub listen_address: Option<IpAddr>,
    pub settle_delay_ms: Option<u64>,
    pub fail_fast: bool,
    pub admin_port: Option<u16>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Build the effective configuration: file (if any), then overrides,
    /// then validation.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self, anyhow::Error> {
        let mut config = match path {
            Some(path) => Self::from_file(path).map_err(|e| {
                anyhow::anyhow!("Failed to load config file '{}': {e}", path.display())
            })?,
            None => Config::default(),
        };
        config.apply(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer command-line values over this configuration.
    pub fn apply(&mut self, overrides: Overrides) -> Result<(), anyhow::Error> {
        if let Some(host) = overrides.host {
            self.daemon.host = host;
        }
        if !overrides.names.is_empty() {
            self.watch = overrides.names;
        }

        match (overrides.tls_cert, overrides.tls_key, overrides.tls_ca) {
            (None, None, None) => {}
            (Some(cert_path), Some(key_path), Some(ca_path)) => {
                self.daemon.tls = Some(TlsConfig {
                    cert_path,
                    key_path,
                    ca_path,
                });
            }
            _ => anyhow::bail!("--tls-cert, --tls-key and --tls-ca must be given together"),
        }

        if let Some(addr) = overrides.listen_address {
            self.listen_address = addr;
        }
        if let Some(delay) = overrides.settle_delay_ms {
            self.reconcile.settle_delay_ms = delay;
        }
        if overrides.fail_fast {
            self.reconcile.wait = WaitPolicy::Fail;
        }
        if overrides.admin_port.is_some() {
            self.admin.port = overrides.admin_port;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.watch.iter().all(|name| name.trim().is_empty()) {
            anyhow::bail!("At least one workload name to watch is required (--name)");
        }

        let address = DaemonAddress::parse(&self.daemon.host)?;
        if self.daemon.tls.is_some() && !matches!(address, DaemonAddress::Tcp(_)) {
            anyhow::bail!(
                "TLS settings require a tcp:// daemon host, got '{}'",
                self.daemon.host
            );
        }

        if self.reconcile.max_poll_attempts > 0 && self.reconcile.poll_interval_ms == 0 {
            anyhow::bail!("reconcile.poll_interval_ms must be greater than zero");
        }

        Ok(())
    }

    /// Admin server address: the proxy listen address plus `admin.port`.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin
            .port
            .map(|port| SocketAddr::new(self.listen_address, port))
    }

    pub fn watch_set(&self) -> WatchSet {
        WatchSet::new(self.watch.iter().map(String::as_str))
    }
}
