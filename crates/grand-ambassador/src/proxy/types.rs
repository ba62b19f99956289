//! Type definitions for the proxy engine.

use serde::Serialize;
use std::net::SocketAddr;

/// Proxy engine error types
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to resolve endpoint: {0}")]
    Resolve(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of a proxy instance.
///
/// Transitions only move forward; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum InstanceState {
    Created = 0,
    Running = 1,
    Closed = 2,
}

impl InstanceState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => InstanceState::Created,
            1 => InstanceState::Running,
            _ => InstanceState::Closed,
        }
    }
}

/// Parse an endpoint of the form `host:port`, `[v6]:port`, or with a
/// leading `<scheme>://` which is ignored.
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr, ProxyError> {
    let addr = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    addr.parse()
        .map_err(|e| ProxyError::Resolve(format!("'{endpoint}': {e}")))
}
