//! Type definitions for the workload directory.

use crate::proxy::Protocol;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

/// A published port of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

/// Parse a daemon port key such as `80/tcp` or `53/udp`.
///
/// A key without a protocol suffix is TCP. Returns `None` for malformed keys
/// and for protocols the proxy engine cannot relay.
pub fn parse_port_key(key: &str) -> Option<PortSpec> {
    let (port, protocol) = key.split_once('/').unwrap_or((key, "tcp"));
    let port = port.trim().parse().ok()?;
    let protocol = match protocol.trim().parse().ok()? {
        Protocol::Tcp | Protocol::Tcp4 | Protocol::Tcp6 => Protocol::Tcp,
        Protocol::Udp | Protocol::Udp4 | Protocol::Udp6 => Protocol::Udp,
    };
    Some(PortSpec { port, protocol })
}

/// Strip the orchestrator-imposed prefix from a workload name (`/web` -> `web`).
pub fn normalize_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Snapshot of a workload's network identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadDescriptor {
    pub id: String,
    /// Normalized name
    pub name: String,
    pub running: bool,
    /// Absent while the workload has no network attachment (e.g. stopped)
    pub address: Option<IpAddr>,
    pub ports: BTreeSet<PortSpec>,
}

/// Lifecycle status carried by a workload event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Restart,
    Die,
    Stop,
    Kill,
    Other(String),
}

impl EventKind {
    pub fn parse(status: &str) -> Self {
        match status {
            "start" => EventKind::Start,
            "restart" => EventKind::Restart,
            "die" => EventKind::Die,
            "stop" => EventKind::Stop,
            "kill" => EventKind::Kill,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// `die`, `stop` or `kill`
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Die | EventKind::Stop | EventKind::Kill)
    }

    /// `start` or `restart`
    pub fn is_start(&self) -> bool {
        matches!(self, EventKind::Start | EventKind::Restart)
    }

    /// Fixed label for metrics; every unrecognized status is `other`.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Restart => "restart",
            EventKind::Die => "die",
            EventKind::Stop => "stop",
            EventKind::Kill => "kill",
            EventKind::Other(_) => "other",
        }
    }
}

/// A workload lifecycle event from the daemon's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub workload_id: String,
    pub status: String,
}

impl Event {
    pub fn new(workload_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            workload_id: workload_id.into(),
            status: status.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.status)
    }
}

/// Workload directory error types
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Workload not found: {0}")]
    NotFound(String),
    #[error("Daemon transport error: {0}")]
    Transport(String),
    #[error("Invalid workload descriptor for {0}: {1}")]
    InvalidDescriptor(String, String),
}
