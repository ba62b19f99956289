use clap::Parser;
use grand_ambassador::admin::AdminServer;
use grand_ambassador::config::{Config, Overrides};
use grand_ambassador::controller::Controller;
use grand_ambassador::directory::DockerDirectory;
use grand_ambassador::registry::ProxyRegistry;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grand-ambassador", version, about = "Port-forwarding ambassador for Docker containers")]
struct Args {
    /// Docker daemon address (unix path, unix://, or tcp://)
    #[arg(short, long, env = "DOCKER_HOST")]
    sock: Option<String>,

    /// Container name to ambassadorize (repeatable)
    #[arg(short, long = "name")]
    names: Vec<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client certificate for a TLS daemon
    #[arg(long)]
    tls_cert: Option<String>,

    /// Client key for a TLS daemon
    #[arg(long)]
    tls_key: Option<String>,

    /// CA certificate for a TLS daemon
    #[arg(long)]
    tls_ca: Option<String>,

    /// Address proxy listeners bind to
    #[arg(long)]
    listen_address: Option<IpAddr>,

    /// Delay before re-resolving a container after start/restart
    #[arg(long = "settle-ms")]
    settle_ms: Option<u64>,

    /// Exit if a watched container is missing or stopped at startup
    #[arg(long)]
    fail_fast: bool,

    /// Serve /health, /proxies and /metrics on this port
    #[arg(long)]
    admin_port: Option<u16>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.sock.clone(),
            names: self.names.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            tls_ca: self.tls_ca.clone(),
            listen_address: self.listen_address,
            settle_delay_ms: self.settle_ms,
            fail_fast: self.fail_fast,
            admin_port: self.admin_port,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let config = Config::load(args.config.as_deref(), args.overrides())?;

    let directory = DockerDirectory::connect(&config.daemon)?;
    directory.ping().await?;
    info!("Connected to Docker daemon at {}", config.daemon.host);

    let registry = Arc::new(ProxyRegistry::new());

    if let Some(addr) = config.admin_addr() {
        let server = AdminServer::new(addr, Arc::clone(&registry));
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                warn!("Admin server stopped: {}", e);
            }
        });
    }

    let controller = Controller::from_config(&config, Arc::new(directory), Arc::clone(&registry));

    let result = tokio::select! {
        result = controller.run() => result.map_err(anyhow::Error::from),
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    registry.stop_all().await;
    result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
