//! A single local-listener-to-remote-endpoint relay.

use super::network::{create_datagram_listener, create_datagram_outbound, create_stream_listener};
use super::protocol::Protocol;
use super::types::{parse_endpoint, InstanceState, ProxyError};
use super::{tcp, udp};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Sockets owned by an instance between bind and `run`.
pub(crate) enum BoundSocket {
    Stream(TcpListener),
    Datagram {
        local: UdpSocket,
        outbound: UdpSocket,
    },
}

/// One bound local listener relaying to a remote endpoint.
///
/// The local socket is claimed in [`ProxyInstance::bind`], so a successfully
/// created instance already owns its port. [`ProxyInstance::close`] can be
/// called any number of times from any task and resolves once every task the
/// instance spawned has finished and the port has been released.
pub struct ProxyInstance {
    protocol: Protocol,
    local: SocketAddr,
    remote: SocketAddr,
    state: AtomicU8,
    socket: Mutex<Option<BoundSocket>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ProxyInstance {
    /// Create an instance from textual endpoints and protocol name.
    pub fn create(local: &str, remote: &str, protocol: &str) -> Result<Self, ProxyError> {
        let protocol: Protocol = protocol.parse()?;
        let local = parse_endpoint(local)?;
        let remote = parse_endpoint(remote)?;
        Self::bind(local, remote, protocol)
    }

    /// Bind `local` and prepare to relay to `remote`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        local: SocketAddr,
        remote: SocketAddr,
        protocol: Protocol,
    ) -> Result<Self, ProxyError> {
        protocol.check_family(&local)?;
        protocol.check_family(&remote)?;

        let socket = if protocol.is_stream() {
            BoundSocket::Stream(create_stream_listener(local)?)
        } else {
            BoundSocket::Datagram {
                local: create_datagram_listener(local)?,
                outbound: create_datagram_outbound(remote)?,
            }
        };

        // Port 0 binds resolve to a concrete port here
        let local = match &socket {
            BoundSocket::Stream(listener) => listener.local_addr()?,
            BoundSocket::Datagram { local, .. } => local.local_addr()?,
        };

        debug!("Bound {} listener on {} -> {}", protocol, local, remote);

        Ok(Self {
            protocol,
            local,
            remote,
            state: AtomicU8::new(InstanceState::Created as u8),
            socket: Mutex::new(Some(socket)),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> InstanceState {
        InstanceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Relay traffic until the instance is closed.
    ///
    /// Returns immediately if the instance was already run or closed.
    pub async fn run(&self) -> Result<(), ProxyError> {
        // Held for the whole run so close() waits for the socket to drop
        let _running = self.tasks.token();

        let Some(socket) = self.socket.lock().take() else {
            debug!("Proxy {} -> {} not runnable, skipping", self.local, self.remote);
            return Ok(());
        };

        if self
            .state
            .compare_exchange(
                InstanceState::Created as u8,
                InstanceState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        debug!(
            "Relaying {}://{} -> {}",
            self.protocol, self.local, self.remote
        );

        match socket {
            BoundSocket::Stream(listener) => {
                tcp::accept_loop(
                    listener,
                    self.remote,
                    self.shutdown.clone(),
                    self.tasks.clone(),
                )
                .await
            }
            BoundSocket::Datagram { local, outbound } => {
                udp::relay_loop(local, outbound, self.shutdown.clone()).await
            }
        }

        debug!("Proxy {} -> {} stopped", self.local, self.remote);
        Ok(())
    }

    /// Spawn [`ProxyInstance::run`] as a background task.
    pub fn serve(self: &Arc<Self>) {
        let instance = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = instance.run().await {
                tracing::error!(
                    "Proxy {} -> {} failed: {}",
                    instance.local,
                    instance.remote,
                    e
                );
            }
        });
    }

    /// Stop relaying and release the local port.
    pub async fn close(&self) {
        let previous = self.state.swap(InstanceState::Closed as u8, Ordering::AcqRel);
        if previous != InstanceState::Closed as u8 {
            debug!("Closing proxy {} -> {}", self.local, self.remote);
            self.shutdown.cancel();
            self.tasks.close();
        }
        // Never run: the socket is still parked here
        drop(self.socket.lock().take());
        self.tasks.wait().await;
    }
}

impl std::fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("protocol", &self.protocol)
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}
