//! Reconciliation timing, wait policy, and admin server settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with a watched workload that is missing or stopped at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    /// Wait for it to be created/started
    #[default]
    Wait,
    /// Treat it as a fatal startup error
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconcileConfig {
    /// Delay before re-resolving a workload after `start`/`restart`
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Backoff between polls of a workload that is not running yet
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default)]
    pub wait: WaitPolicy,
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_max_poll_attempts() -> u32 {
    20
}

impl ReconcileConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            wait: WaitPolicy::default(),
        }
    }
}

/// Status/metrics HTTP server
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}
