//! Proxy groups: every proxy instance for one workload.

use crate::directory::WorkloadDescriptor;
use crate::proxy::{InstanceState, Protocol, ProxyError, ProxyInstance};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;

/// One relay a group will own once bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyTarget {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub protocol: Protocol,
}

/// Unbound description of a proxy group.
///
/// Binding is deferred to [`ProxyRegistry::add`](super::ProxyRegistry::add)
/// so that a displaced group has released its ports first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGroupSpec {
    pub workload_id: String,
    pub workload_name: String,
    pub targets: Vec<ProxyTarget>,
}

impl ProxyGroupSpec {
    /// One target per published port: `listen:port -> address:port`.
    pub fn from_descriptor(
        descriptor: &WorkloadDescriptor,
        listen: IpAddr,
    ) -> Result<Self, ProxyError> {
        let address = descriptor.address.ok_or_else(|| {
            ProxyError::Resolve(format!("workload '{}' has no address", descriptor.name))
        })?;

        let targets = descriptor
            .ports
            .iter()
            .map(|spec| ProxyTarget {
                local: SocketAddr::new(listen, spec.port),
                remote: SocketAddr::new(address, spec.port),
                protocol: spec.protocol,
            })
            .collect();

        Ok(Self {
            workload_id: descriptor.id.clone(),
            workload_name: descriptor.name.clone(),
            targets,
        })
    }

    /// Bind every target. Nothing stays bound if any target fails.
    pub fn bind(self) -> Result<ProxyGroup, ProxyError> {
        let instances = self
            .targets
            .iter()
            .map(|target| {
                ProxyInstance::bind(target.local, target.remote, target.protocol).map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProxyGroup {
            workload_id: self.workload_id,
            workload_name: self.workload_name,
            instances,
            created_at: chrono::Utc::now(),
        })
    }
}

/// The bound proxy instances of one workload.
///
/// The instance set is fixed at construction.
pub struct ProxyGroup {
    workload_id: String,
    workload_name: String,
    instances: Vec<Arc<ProxyInstance>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ProxyGroup {
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    pub fn workload_name(&self) -> &str {
        &self.workload_name
    }

    pub fn instances(&self) -> &[Arc<ProxyInstance>] {
        &self.instances
    }

    /// Start relaying on every instance. Returns without waiting.
    pub fn serve(&self) {
        for instance in &self.instances {
            instance.serve();
        }
    }

    /// Close every instance and wait until all ports are released.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        futures::future::join_all(self.instances.iter().map(|instance| instance.close())).await;
        info!(
            "Closed {} proxies for {} ({})",
            self.instances.len(),
            self.workload_name,
            short_id(&self.workload_id)
        );
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            workload_id: self.workload_id.clone(),
            workload_name: self.workload_name.clone(),
            created_at: self.created_at.to_rfc3339(),
            instances: self
                .instances
                .iter()
                .map(|instance| InstanceStatus {
                    protocol: instance.protocol(),
                    local: instance.local_addr().to_string(),
                    remote: instance.remote_addr().to_string(),
                    state: instance.state(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a group for the admin API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    pub workload_id: String,
    pub workload_name: String,
    pub created_at: String,
    pub instances: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub protocol: Protocol,
    pub local: String,
    pub remote: String,
    pub state: InstanceState,
}

pub(crate) fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
