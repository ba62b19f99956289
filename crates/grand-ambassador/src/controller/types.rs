//! Watch set and controller errors.

use crate::directory::{normalize_name, DirectoryError, WorkloadDescriptor};
use crate::proxy::ProxyError;
use std::collections::BTreeSet;

/// Workloads to ambassadorize, by name or id. Fixed after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    names: BTreeSet<String>,
}

impl WatchSet {
    /// Names are normalized; blank entries are dropped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| normalize_name(name.as_ref().trim()).to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(normalize_name(name))
    }

    /// Whether a descriptor is watched, either by its name or by its id
    /// (full or short prefix).
    pub fn matches(&self, descriptor: &WorkloadDescriptor) -> bool {
        self.contains(&descriptor.name)
            || self
                .names
                .iter()
                .any(|entry| descriptor.id.starts_with(entry.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Controller error types
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Watched workload '{0}' is not available")]
    MissingWorkload(String),
    #[error("Workload '{0}' did not reach running state")]
    NotRunning(String),
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Workload event feed closed")]
    EventFeedClosed,
}
