//! Admin HTTP server.
//!
//! Read-only status for operators:
//! - `GET /health` - liveness
//! - `GET /proxies` - active proxy groups as JSON
//! - `GET /metrics` - Prometheus text exposition

mod router;
mod server;
mod types;

pub use router::{route, route_request};
pub use server::AdminServer;
pub use types::{error_response, json_response, not_found, ProxiesResponse};
