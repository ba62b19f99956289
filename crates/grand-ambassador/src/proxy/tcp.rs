//! Stream relaying.

use crate::metrics;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Pause after a failed accept (e.g. EMFILE) before retrying
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accept connections until `shutdown` fires, relaying each one to `remote`
/// on its own tracked task.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    remote: SocketAddr,
    shutdown: CancellationToken,
    tasks: TaskTracker,
) {
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or_default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("Accepted {} on port {}", peer, port);
                        metrics::record_connection(port, "tcp");
                        tasks.spawn(relay_connection(stream, peer, remote, shutdown.clone()));
                    }
                    Err(e) => {
                        error!("Accept error on port {}: {}", port, e);
                        if !backoff_after_accept_error(&shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Wait out [`ACCEPT_BACKOFF`]. Returns `false` if shut down meanwhile.
async fn backoff_after_accept_error(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

/// Dial `remote` and pump bytes both ways.
///
/// The pair is torn down as soon as either direction finishes, or when the
/// owning instance shuts down.
async fn relay_connection(
    mut inbound: TcpStream,
    peer: SocketAddr,
    remote: SocketAddr,
    shutdown: CancellationToken,
) {
    let dialed = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        dialed = TcpStream::connect(remote) => dialed,
    };

    let mut outbound = match dialed {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Failed to connect to {} for {}: {}", remote, peer, e);
            metrics::record_dial_failure(remote.port());
            return;
        }
    };
    let _ = outbound.set_nodelay(true);

    let (mut inbound_read, mut inbound_write) = inbound.split();
    let (mut outbound_read, mut outbound_write) = outbound.split();

    tokio::select! {
        _ = shutdown.cancelled() => {
            debug!("Closing {} -> {}: proxy shutting down", peer, remote);
        }
        result = tokio::io::copy(&mut inbound_read, &mut outbound_write) => {
            if let Err(e) = result {
                debug!("{} -> {} copy ended: {}", peer, remote, e);
            }
        }
        result = tokio::io::copy(&mut outbound_read, &mut inbound_write) => {
            if let Err(e) = result {
                debug!("{} -> {} copy ended: {}", remote, peer, e);
            }
        }
    }
}
