//! Reconciliation controller.
//!
//! Drives proxy group lifecycle from workload lifecycle events:
//! - startup: resolve every watched name, serve the running ones
//! - `start`/`restart`: re-resolve and replace the workload's group
//! - `die`/`stop`/`kill`: stop the workload's group
//!
//! # Module Structure
//!
//! - `reconciler` - `Controller` and the event loop
//! - `discovery` - polling a workload until it reports running
//! - `types` - `WatchSet` and `ControllerError`

mod reconciler;
mod discovery;
mod types;


pub use reconciler::Controller;
pub use discovery::wait_for_running;
pub use types::{ControllerError, WatchSet};
