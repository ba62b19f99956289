//! Proxy engine.
//!
//! This module relays traffic between a bound local endpoint and a workload's
//! current address:
//! - TCP: accept loop with one task per connection pair
//! - UDP: datagram relay with single-client return routing
//!
//! # Module Structure
//!
//! - `instance` - `ProxyInstance` lifecycle (bind, run, close)
//! - `tcp` - stream accept loop and bidirectional copy
//! - `udp` - datagram relay loop
//! - `network` - socket construction (`socket2`)
//! - `protocol` - supported transport protocols
//! - `types` - errors, lifecycle state, endpoint parsing

mod instance;
mod network;
mod protocol;
mod tcp;
mod types;
mod udp;

#[cfg(test)]
mod tests;

pub use instance::ProxyInstance;
pub use protocol::Protocol;
pub use types::{parse_endpoint, InstanceState, ProxyError};
