//! Socket construction for proxy instances.
//!
//! Listeners are created through `socket2` so socket options can be set
//! before binding, then handed to tokio.

use super::types::ProxyError;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{TcpListener, UdpSocket};

const LISTEN_BACKLOG: i32 = 1024;

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

/// Create a TCP listener with SO_REUSEADDR enabled.
///
/// SO_REUSEADDR lets a replacement listener claim a port whose previous
/// connections are still in TIME_WAIT. It does not allow two live listeners
/// on the same port, so a port held by another listener still fails here.
///
/// Must be called from within a tokio runtime.
pub fn create_stream_listener(addr: SocketAddr) -> Result<TcpListener, ProxyError> {
    let bind_err = |source| ProxyError::Bind { addr, source };

    let socket = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(bind_err)
}

/// Create the local UDP socket for a datagram proxy.
///
/// Must be called from within a tokio runtime.
pub fn create_datagram_listener(addr: SocketAddr) -> Result<UdpSocket, ProxyError> {
    let bind_err = |source| ProxyError::Bind { addr, source };

    let socket = Socket::new(domain_for(&addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(bind_err)
}

/// Create the outbound UDP socket a datagram proxy forwards from.
///
/// Bound to an ephemeral port of the remote's address family and connected
/// to `remote`, so only replies from the workload are received on it.
pub fn create_datagram_outbound(remote: SocketAddr) -> Result<UdpSocket, ProxyError> {
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let bind_err = |source| ProxyError::Bind { addr: local, source };

    let socket = Socket::new(domain_for(&remote), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&local.into()).map_err(bind_err)?;
    socket.connect(&remote.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}
