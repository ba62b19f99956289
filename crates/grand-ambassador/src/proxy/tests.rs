//! Tests for the proxy engine.
//!
//! These exercise real loopback sockets: TCP echo round-trips, failed dials,
//! close semantics, and the UDP single-client relay.

use super::*;
use serial_test::serial;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_tcp_echo(addr: &str) -> SocketAddr {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..len], peer).await;
        }
    });
    addr
}

async fn free_tcp_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn ping(addr: SocketAddr) -> Vec<u8> {
    let mut stream = timeout(IO_TIMEOUT, TcpStream::connect(addr))
        .await
        .unwrap()
        .unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf.to_vec()
}

fn local_any() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn test_tcp_echo_roundtrip() {
    let echo = spawn_tcp_echo("127.0.0.1:0").await;
    let proxy = Arc::new(ProxyInstance::bind(local_any(), echo, Protocol::Tcp).unwrap());
    assert_eq!(proxy.state(), InstanceState::Created);

    proxy.serve();
    assert_eq!(ping(proxy.local_addr()).await, b"ping");
    assert_eq!(proxy.state(), InstanceState::Running);

    proxy.close().await;
    assert_eq!(proxy.state(), InstanceState::Closed);
}

#[tokio::test]
#[serial]
async fn test_tcp_fixed_port_forwarding() {
    let echo = spawn_tcp_echo("127.0.0.1:9100").await;
    let proxy = Arc::new(ProxyInstance::create("0.0.0.0:9000", &echo.to_string(), "tcp").unwrap());
    proxy.serve();

    let reply = ping("127.0.0.1:9000".parse().unwrap()).await;
    assert_eq!(reply, b"ping");

    proxy.close().await;
}

#[tokio::test]
async fn test_failed_dial_keeps_listener_running() {
    let backend_port = free_tcp_port().await;
    let backend: SocketAddr = ([127, 0, 0, 1], backend_port).into();
    let proxy = Arc::new(ProxyInstance::bind(local_any(), backend, Protocol::Tcp).unwrap());
    proxy.serve();

    // Nothing listens on the backend yet: the inbound side gets closed
    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let mut buf = [0u8; 1];
    let read = timeout(IO_TIMEOUT, stream.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    spawn_tcp_echo(&backend.to_string()).await;
    assert_eq!(ping(proxy.local_addr()).await, b"ping");

    proxy.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent_and_releases_port() {
    let echo = spawn_tcp_echo("127.0.0.1:0").await;
    let proxy = Arc::new(ProxyInstance::bind(local_any(), echo, Protocol::Tcp).unwrap());
    let addr = proxy.local_addr();
    proxy.serve();
    assert_eq!(ping(addr).await, b"ping");

    proxy.close().await;
    proxy.close().await;
    assert_eq!(proxy.state(), InstanceState::Closed);

    let rebound = ProxyInstance::bind(addr, echo, Protocol::Tcp);
    assert!(rebound.is_ok(), "port should be free after close");
}

#[tokio::test]
async fn test_close_before_run() {
    let echo = spawn_tcp_echo("127.0.0.1:0").await;
    let proxy = ProxyInstance::bind(local_any(), echo, Protocol::Tcp).unwrap();
    let addr = proxy.local_addr();

    proxy.close().await;
    assert!(ProxyInstance::bind(addr, echo, Protocol::Tcp).is_ok());

    // A closed instance never starts relaying
    timeout(IO_TIMEOUT, proxy.run()).await.unwrap().unwrap();
    assert_eq!(proxy.state(), InstanceState::Closed);
}

#[tokio::test]
async fn test_close_from_other_task_unblocks_run() {
    let echo = spawn_tcp_echo("127.0.0.1:0").await;
    let proxy = Arc::new(ProxyInstance::bind(local_any(), echo, Protocol::Tcp).unwrap());

    let runner = {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move { proxy.run().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let closer = {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move { proxy.close().await })
    };
    closer.await.unwrap();

    let result = timeout(IO_TIMEOUT, runner).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_close_tears_down_open_connections() {
    let echo = spawn_tcp_echo("127.0.0.1:0").await;
    let proxy = Arc::new(ProxyInstance::bind(local_any(), echo, Protocol::Tcp).unwrap());
    proxy.serve();

    let mut stream = TcpStream::connect(proxy.local_addr()).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();

    proxy.close().await;

    let mut rest = [0u8; 1];
    let read = timeout(IO_TIMEOUT, stream.read(&mut rest)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_udp_echo_roundtrip() {
    let echo = spawn_udp_echo().await;
    let proxy = Arc::new(ProxyInstance::bind(local_any(), echo, Protocol::Udp).unwrap());
    proxy.serve();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"ping", proxy.local_addr()).await.unwrap();
    let mut buf = [0u8; 16];
    let (len, from) = timeout(IO_TIMEOUT, client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"ping");
    assert_eq!(from, proxy.local_addr());

    proxy.close().await;
    assert!(ProxyInstance::bind(proxy.local_addr(), echo, Protocol::Udp).is_ok());
}

#[tokio::test]
async fn test_udp_replies_follow_latest_client() {
    let backend = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let proxy = Arc::new(
        ProxyInstance::bind(local_any(), backend.local_addr().unwrap(), Protocol::Udp).unwrap(),
    );
    proxy.serve();

    let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 16];

    first.send_to(b"one", proxy.local_addr()).await.unwrap();
    let (_, relay) = timeout(IO_TIMEOUT, backend.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    second.send_to(b"two", proxy.local_addr()).await.unwrap();
    timeout(IO_TIMEOUT, backend.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    backend.send_to(b"reply", relay).await.unwrap();

    let (len, _) = timeout(IO_TIMEOUT, second.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len], b"reply");
    let stale = timeout(Duration::from_millis(200), first.recv_from(&mut buf)).await;
    assert!(stale.is_err(), "displaced client must not receive replies");

    proxy.close().await;
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    assert!(matches!(
        ProxyInstance::create("0.0.0.0:0", "10.0.0.5:80", "sctp"),
        Err(ProxyError::UnsupportedProtocol(_))
    ));
    assert!(matches!(
        ProxyInstance::create("0.0.0.0", "10.0.0.5:80", "tcp"),
        Err(ProxyError::Resolve(_))
    ));
    assert!(matches!(
        ProxyInstance::create("127.0.0.1:0", "[::1]:80", "tcp4"),
        Err(ProxyError::Resolve(_))
    ));
}

#[tokio::test]
async fn test_bind_conflict_reports_bind_error() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken = holder.local_addr().unwrap();
    let result = ProxyInstance::bind(taken, "127.0.0.1:1".parse().unwrap(), Protocol::Tcp);
    assert!(matches!(result, Err(ProxyError::Bind { addr, .. }) if addr == taken));
}
