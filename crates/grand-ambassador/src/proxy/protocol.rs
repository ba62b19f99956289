//! Transport protocols supported by the proxy engine.

use super::types::ProxyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Transport protocol for a proxy instance.
///
/// The `4`/`6` variants pin the address family; the plain variants accept
/// either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
}

impl Protocol {
    /// Get protocol name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp4 => "tcp4",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp4 => "udp4",
            Protocol::Udp6 => "udp6",
        }
    }

    /// Whether this is a stream (TCP) protocol
    pub fn is_stream(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Tcp4 | Protocol::Tcp6)
    }

    /// Check that an address belongs to the family this protocol is pinned to.
    pub fn check_family(&self, addr: &SocketAddr) -> Result<(), ProxyError> {
        let ok = match self {
            Protocol::Tcp4 | Protocol::Udp4 => addr.is_ipv4(),
            Protocol::Tcp6 | Protocol::Udp6 => addr.is_ipv6(),
            Protocol::Tcp | Protocol::Udp => true,
        };
        if ok {
            Ok(())
        } else {
            Err(ProxyError::Resolve(format!(
                "{addr} is not a valid {} address",
                self.as_str()
            )))
        }
    }
}

impl FromStr for Protocol {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "tcp4" => Ok(Protocol::Tcp4),
            "tcp6" => Ok(Protocol::Tcp6),
            "udp" => Ok(Protocol::Udp),
            "udp4" => Ok(Protocol::Udp4),
            "udp6" => Ok(Protocol::Udp6),
            _ => Err(ProxyError::UnsupportedProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
