//! Daemon connection and TLS configuration.

use serde::{Deserialize, Serialize};

/// TLS client credentials for a remote daemon (PEM files)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// `unix:///path`, a bare socket path, or `tcp://host:port`
    #[serde(default = "default_host")]
    pub host: String,
    /// TLS settings (only valid with a TCP host)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

pub const DEFAULT_DAEMON_HOST: &str = "unix:///var/run/docker.sock";

fn default_host() -> String {
    DEFAULT_DAEMON_HOST.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            tls: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddress {
    /// Unix socket path
    Unix(String),
    /// `tcp://host:port`
    Tcp(String),
}

impl DaemonAddress {
    /// Parse a daemon host string. A value without a scheme is a unix socket
    /// path; `http://` is accepted as an alias for `tcp://`.
    pub fn parse(host: &str) -> Result<Self, anyhow::Error> {
        match host.split_once("://") {
            None if !host.is_empty() => Ok(DaemonAddress::Unix(host.to_string())),
            Some(("unix", path)) if !path.is_empty() => Ok(DaemonAddress::Unix(path.to_string())),
            Some(("tcp" | "http" | "https", addr)) if !addr.is_empty() => {
                Ok(DaemonAddress::Tcp(format!("tcp://{addr}")))
            }
            _ => anyhow::bail!("Unsupported daemon address: '{host}'"),
        }
    }
}
