//! In-memory workload directory.
//!
//! Descriptors are registered directly and events are pushed by the caller,
//! which makes controller behaviour reproducible without a daemon.

use super::types::{normalize_name, DirectoryError, Event, WorkloadDescriptor};
use super::{EventStream, WorkloadDirectory};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Scriptable workload directory.
pub struct InMemoryDirectory {
    /// Descriptors by id
    workloads: RwLock<HashMap<String, WorkloadDescriptor>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            workloads: RwLock::new(HashMap::new()),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        }
    }

    /// Insert or replace a workload descriptor (keyed by id).
    pub fn upsert(&self, descriptor: WorkloadDescriptor) {
        self.workloads
            .write()
            .insert(descriptor.id.clone(), descriptor);
    }

    /// Forget a workload by name or id.
    pub fn remove(&self, identity: &str) {
        let mut workloads = self.workloads.write();
        workloads.retain(|id, descriptor| id != identity && descriptor.name != normalize_name(identity));
    }

    /// Push an event onto the feed. Ignored once the feed is closed.
    pub fn publish(&self, event: Event) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// End the event feed, as if the daemon connection dropped.
    pub fn close_feed(&self) {
        self.events_tx.lock().take();
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkloadDirectory for InMemoryDirectory {
    async fn fetch_descriptor(&self, identity: &str) -> Result<WorkloadDescriptor, DirectoryError> {
        let workloads = self.workloads.read();
        if let Some(descriptor) = workloads.get(identity) {
            return Ok(descriptor.clone());
        }
        let name = normalize_name(identity);
        workloads
            .values()
            .find(|descriptor| descriptor.name == name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(identity.to_string()))
    }

    /// The feed can be subscribed to once.
    async fn subscribe_events(&self) -> Result<EventStream, DirectoryError> {
        let rx = self
            .events_rx
            .lock()
            .take()
            .ok_or_else(|| DirectoryError::Transport("event feed already subscribed".to_string()))?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (Ok(event), rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::PortSpec;
    use std::collections::BTreeSet;

    fn descriptor(id: &str, name: &str) -> WorkloadDescriptor {
        WorkloadDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            running: true,
            address: Some("10.0.0.5".parse().unwrap()),
            ports: BTreeSet::from([PortSpec::tcp(80)]),
        }
    }

    #[tokio::test]
    async fn test_fetch_by_id_and_name() {
        let directory = InMemoryDirectory::new();
        directory.upsert(descriptor("abc", "web"));

        assert_eq!(directory.fetch_descriptor("abc").await.unwrap().name, "web");
        assert_eq!(directory.fetch_descriptor("/web").await.unwrap().id, "abc");
        assert!(matches!(
            directory.fetch_descriptor("db").await,
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let directory = InMemoryDirectory::new();
        directory.upsert(descriptor("abc", "web"));
        directory.remove("web");
        assert!(directory.fetch_descriptor("abc").await.is_err());
    }

    #[tokio::test]
    async fn test_event_feed_order_and_close() {
        let directory = InMemoryDirectory::new();
        let mut events = directory.subscribe_events().await.unwrap();
        directory.publish(Event::new("abc", "start"));
        directory.publish(Event::new("abc", "die"));
        directory.close_feed();

        assert_eq!(events.next().await.unwrap().unwrap().status, "start");
        assert_eq!(events.next().await.unwrap().unwrap().status, "die");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn test_single_subscription() {
        let directory = InMemoryDirectory::new();
        let _events = directory.subscribe_events().await.unwrap();
        assert!(matches!(
            directory.subscribe_events().await,
            Err(DirectoryError::Transport(_))
        ));
    }
}
