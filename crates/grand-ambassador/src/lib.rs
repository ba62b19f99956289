//! grand-ambassador: a port-forwarding sidecar that follows the lifecycle of
//! one or more named Docker containers.
//!
//! For each watched workload the ambassador listens on every published port
//! and relays TCP connections and UDP datagrams to the workload's current
//! address, rebuilding the listeners when the workload restarts.

pub mod admin;
pub mod config;
pub mod controller;
pub mod directory;
pub mod metrics;
pub mod proxy;
pub mod registry;
