//! Proxy groups and the registry that owns them.
//!
//! - `ProxyGroupSpec`: unbound plan for a workload's proxies
//! - `ProxyGroup`: bound instances for one workload
//! - `ProxyRegistry`: the active groups, indexed by workload name and id

mod group;
mod manager;


pub use group::{GroupStatus, InstanceStatus, ProxyGroup, ProxyGroupSpec, ProxyTarget};
pub use manager::ProxyRegistry;
