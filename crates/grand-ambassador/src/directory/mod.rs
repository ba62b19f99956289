//! Workload directory: where descriptors and lifecycle events come from.
//!
//! - `DockerDirectory`: talks to a Docker daemon through `bollard`
//! - `InMemoryDirectory`: scriptable directory for tests and embedding

mod docker;
mod memory;
mod types;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use docker::DockerDirectory;
pub use memory::InMemoryDirectory;
pub use types::{
    normalize_name, parse_port_key, DirectoryError, Event, EventKind, PortSpec,
    WorkloadDescriptor,
};

/// Ordered stream of workload events; ends when the transport closes.
pub type EventStream = BoxStream<'static, Result<Event, DirectoryError>>;

/// Source of workload descriptors and lifecycle events.
#[async_trait]
pub trait WorkloadDirectory: Send + Sync {
    /// Resolve a workload by name or id to its current descriptor.
    async fn fetch_descriptor(&self, identity: &str) -> Result<WorkloadDescriptor, DirectoryError>;

    /// Subscribe to the daemon's workload event feed.
    async fn subscribe_events(&self) -> Result<EventStream, DirectoryError>;
}
