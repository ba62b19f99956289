//! ProxyRegistry - the set of proxy groups currently serving traffic.
//!
//! Groups are indexed by workload name and by workload id. Both indexes point
//! at the same `Arc<ProxyGroup>` and are only ever updated together.

use super::group::{short_id, ProxyGroup, ProxyGroupSpec};
use crate::metrics;
use crate::proxy::ProxyError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct Indexes {
    by_name: HashMap<String, Arc<ProxyGroup>>,
    by_id: HashMap<String, Arc<ProxyGroup>>,
}

impl Indexes {
    fn insert(&mut self, group: Arc<ProxyGroup>) {
        self.by_name
            .insert(group.workload_name().to_string(), Arc::clone(&group));
        self.by_id.insert(group.workload_id().to_string(), group);
    }

    /// Remove a group from both indexes.
    fn remove(&mut self, group: &ProxyGroup) {
        self.by_name.remove(group.workload_name());
        self.by_id.remove(group.workload_id());
    }

    fn lookup(&self, identity: &str) -> Option<Arc<ProxyGroup>> {
        self.by_name
            .get(identity)
            .or_else(|| self.by_id.get(identity))
            .cloned()
    }
}

/// Registry of active proxy groups.
pub struct ProxyRegistry {
    indexes: RwLock<Indexes>,
    /// Serializes add/stop, including the awaits for closing and binding
    mutations: Mutex<()>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(Indexes::default()),
            mutations: Mutex::new(()),
        }
    }

    /// Replace whatever is registered for the group's workload with a freshly
    /// bound group.
    ///
    /// Any existing group for the same name (or id) is closed, and its ports
    /// released, before the new group binds. If binding fails the workload is
    /// left without a group.
    pub async fn add(&self, spec: ProxyGroupSpec) -> Result<Arc<ProxyGroup>, ProxyError> {
        let _guard = self.mutations.lock().await;

        let displaced: Vec<Arc<ProxyGroup>> = {
            let mut indexes = self.indexes.write();
            let mut displaced = Vec::new();
            for identity in [&spec.workload_name, &spec.workload_id] {
                if let Some(existing) = indexes.lookup(identity) {
                    indexes.remove(&existing);
                    displaced.push(existing);
                }
            }
            displaced
        };
        for group in &displaced {
            debug!("Replacing proxies for {}", group.workload_name());
            group.close().await;
        }

        let result = spec.bind().map(Arc::new);
        if let Ok(group) = &result {
            self.indexes.write().insert(Arc::clone(group));
            info!(
                "Registered {} proxies for {} ({})",
                group.instances().len(),
                group.workload_name(),
                short_id(group.workload_id())
            );
        }
        metrics::set_active_groups(self.len());
        result
    }

    /// Close and remove the group for `identity` (name first, then id).
    ///
    /// Returns the stopped group, or `None` if nothing was registered.
    pub async fn stop(&self, identity: &str) -> Option<Arc<ProxyGroup>> {
        let _guard = self.mutations.lock().await;

        let group = {
            let mut indexes = self.indexes.write();
            let group = indexes.lookup(identity)?;
            indexes.remove(&group);
            group
        };
        group.close().await;
        metrics::set_active_groups(self.len());
        Some(group)
    }

    /// Close every registered group.
    pub async fn stop_all(&self) {
        let _guard = self.mutations.lock().await;

        let groups: Vec<Arc<ProxyGroup>> = {
            let mut indexes = self.indexes.write();
            indexes.by_id.clear();
            indexes.by_name.drain().map(|(_, group)| group).collect()
        };
        futures::future::join_all(groups.iter().map(|group| group.close())).await;
        metrics::set_active_groups(0);
    }

    /// Look up a group by workload name or id
    pub fn get(&self, identity: &str) -> Option<Arc<ProxyGroup>> {
        self.indexes.read().lookup(identity)
    }

    /// All registered groups, ordered by workload name
    pub fn list(&self) -> Vec<Arc<ProxyGroup>> {
        let mut groups: Vec<Arc<ProxyGroup>> =
            self.indexes.read().by_name.values().cloned().collect();
        groups.sort_by(|a, b| a.workload_name().cmp(b.workload_name()));
        groups
    }

    pub fn len(&self) -> usize {
        self.indexes.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
