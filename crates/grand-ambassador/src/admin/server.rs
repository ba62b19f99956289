//! Admin server accept loop.

use super::router::route_request;
use crate::registry::ProxyRegistry;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Status and metrics server for the ambassador
pub struct AdminServer {
    addr: SocketAddr,
    registry: Arc<ProxyRegistry>,
}

impl AdminServer {
    pub fn new(addr: SocketAddr, registry: Arc<ProxyRegistry>) -> Self {
        Self { addr, registry }
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Admin server listening on http://{}", listener.local_addr()?);
        self.serve(listener).await
    }

    pub(crate) async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let registry = Arc::clone(&self.registry);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let registry = Arc::clone(&registry);
                    async move { route_request(req, registry).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Admin connection error: {}", e);
                }
            });
        }
    }
}
