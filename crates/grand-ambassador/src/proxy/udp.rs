//! Datagram relaying.
//!
//! Replies from the workload go to the most recent client seen on the local
//! socket. There is no per-client session table: a second client displaces
//! the first as the return target.

use crate::metrics;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MAX_DATAGRAM: usize = 64 * 1024;

pub(crate) async fn relay_loop(local: UdpSocket, outbound: UdpSocket, shutdown: CancellationToken) {
    let port = local
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or_default();
    let mut client: Option<SocketAddr> = None;
    let mut inbound_buf = vec![0u8; MAX_DATAGRAM];
    let mut reply_buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = local.recv_from(&mut inbound_buf) => {
                let (len, peer) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        debug!("UDP receive error on port {}: {}", port, e);
                        continue;
                    }
                };
                if client != Some(peer) {
                    debug!("UDP port {} now replying to {}", port, peer);
                    client = Some(peer);
                }
                match outbound.send(&inbound_buf[..len]).await {
                    Ok(_) => metrics::record_datagram(port, "outbound"),
                    Err(e) => debug!("UDP forward from port {} failed: {}", port, e),
                }
            }
            result = outbound.recv(&mut reply_buf) => {
                let len = match result {
                    Ok(len) => len,
                    Err(e) => {
                        // ICMP unreachable surfaces here on a connected socket
                        debug!("UDP reply error on port {}: {}", port, e);
                        continue;
                    }
                };
                let Some(peer) = client else {
                    debug!("Dropping UDP reply on port {}: no client yet", port);
                    continue;
                };
                match local.send_to(&reply_buf[..len], peer).await {
                    Ok(_) => metrics::record_datagram(port, "reply"),
                    Err(e) => debug!("UDP reply to {} failed: {}", peer, e),
                }
            }
        }
    }
}
