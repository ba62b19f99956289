//! Controller - keeps one proxy group per running watched workload.

use super::discovery::wait_for_running;
use super::types::{ControllerError, WatchSet};
use crate::config::{Config, ReconcileConfig, WaitPolicy};
use crate::directory::{DirectoryError, Event, EventKind, WorkloadDescriptor, WorkloadDirectory};
use crate::metrics;
use crate::registry::{ProxyGroupSpec, ProxyRegistry};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Controller {
    directory: Arc<dyn WorkloadDirectory>,
    registry: Arc<ProxyRegistry>,
    watch: WatchSet,
    listen: IpAddr,
    settings: ReconcileConfig,
    /// Workload id -> watched name, for ids seen since startup
    tracked: HashMap<String, String>,
}

impl Controller {
    pub fn new(
        directory: Arc<dyn WorkloadDirectory>,
        registry: Arc<ProxyRegistry>,
        watch: WatchSet,
        listen: IpAddr,
        settings: ReconcileConfig,
    ) -> Self {
        Self {
            directory,
            registry,
            watch,
            listen,
            settings,
            tracked: HashMap::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        directory: Arc<dyn WorkloadDirectory>,
        registry: Arc<ProxyRegistry>,
    ) -> Self {
        Self::new(
            directory,
            registry,
            config.watch_set(),
            config.listen_address,
            config.reconcile.clone(),
        )
    }

    /// Serve the watched workloads, then follow the event feed.
    ///
    /// The feed is subscribed before the initial pass so no lifecycle event
    /// between the two is lost. Only returns on a startup failure or when
    /// the feed ends.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        let mut events = self.directory.subscribe_events().await?;
        self.start_watched().await?;

        info!("Watching events for {} workload(s)", self.watch.len());
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.handle_event(event).await,
                Err(e) => warn!("Event feed error: {}", e),
            }
        }

        warn!("Workload event feed closed");
        Err(ControllerError::EventFeedClosed)
    }

    async fn start_watched(&mut self) -> Result<(), ControllerError> {
        let names: Vec<String> = self.watch.iter().map(str::to_string).collect();
        for name in names {
            match self.directory.fetch_descriptor(&name).await {
                Ok(descriptor) if !self.watch.matches(&descriptor) => {
                    warn!(
                        "Lookup of {} returned unwatched workload {}",
                        name, descriptor.name
                    );
                    self.pending(&name, "not resolvable")?;
                }
                Ok(descriptor) if descriptor.running => {
                    self.track(&descriptor);
                    self.activate(&descriptor).await?;
                }
                Ok(descriptor) => {
                    self.track(&descriptor);
                    self.pending(&name, "not running")?;
                }
                Err(DirectoryError::NotFound(_)) => self.pending(&name, "not created")?,
                Err(e) => {
                    if self.settings.wait == WaitPolicy::Fail {
                        return Err(e.into());
                    }
                    warn!("Could not resolve {}: {}; waiting for events", name, e);
                }
            }
        }
        Ok(())
    }

    fn pending(&self, name: &str, reason: &str) -> Result<(), ControllerError> {
        match self.settings.wait {
            WaitPolicy::Fail => Err(ControllerError::MissingWorkload(name.to_string())),
            WaitPolicy::Wait => {
                info!("Workload {} is {}; waiting for it to start", name, reason);
                Ok(())
            }
        }
    }

    fn track(&mut self, descriptor: &WorkloadDescriptor) {
        // A recreated workload keeps its name under a new id
        self.tracked
            .retain(|id, name| *name != descriptor.name || *id == descriptor.id);
        self.tracked
            .insert(descriptor.id.clone(), descriptor.name.clone());
    }

    /// Bind and serve a group for a running descriptor.
    async fn activate(&self, descriptor: &WorkloadDescriptor) -> Result<(), ControllerError> {
        if descriptor.ports.is_empty() {
            warn!(
                "Workload {} publishes no ports; nothing to proxy",
                descriptor.name
            );
            return Ok(());
        }

        let spec = ProxyGroupSpec::from_descriptor(descriptor, self.listen)?;
        let group = self.registry.add(spec).await?;
        group.serve();
        for instance in group.instances() {
            info!(
                "Proxying {}/{} {} -> {}",
                descriptor.name,
                instance.protocol(),
                instance.local_addr(),
                instance.remote_addr()
            );
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: Event) {
        let kind = event.kind();
        let outcome = match kind {
            EventKind::Other(_) => "ignored",
            ref kind if kind.is_terminal() => self.on_terminal(&event).await,
            _ => self.on_start(&event).await,
        };
        debug!(
            "Event {} for {}: {}",
            event.status, event.workload_id, outcome
        );
        metrics::record_event(kind.label(), outcome);
    }

    async fn on_terminal(&mut self, event: &Event) -> &'static str {
        let Some(name) = self.tracked.get(&event.workload_id) else {
            return "ignored";
        };
        info!("Workload {} {}; stopping its proxies", name, event.status);
        match self.registry.stop(&event.workload_id).await {
            Some(_) => "stopped",
            None => "noop",
        }
    }

    async fn on_start(&mut self, event: &Event) -> &'static str {
        let id = event.workload_id.as_str();
        let name = match self.tracked.get(id) {
            Some(name) => name.clone(),
            None => match self.directory.fetch_descriptor(id).await {
                Ok(descriptor) if self.watch.matches(&descriptor) => {
                    self.track(&descriptor);
                    descriptor.name
                }
                Ok(_) => return "ignored",
                Err(e) => {
                    debug!("Skipping event for unknown workload {}: {}", id, e);
                    return "ignored";
                }
            },
        };

        if !self.settings.settle_delay().is_zero() {
            tokio::time::sleep(self.settings.settle_delay()).await;
        }

        let resolved = wait_for_running(
            self.directory.as_ref(),
            id,
            self.settings.poll_interval(),
            self.settings.max_poll_attempts,
        )
        .await;

        // The previous group points at a stale address either way
        self.registry.stop(&name).await;

        let descriptor = match resolved {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Could not resolve {} after {}: {}", name, event.status, e);
                return "failed";
            }
        };
        if !self.watch.matches(&descriptor) {
            info!(
                "Workload {} was renamed to {}; no longer watched",
                name, descriptor.name
            );
            self.tracked.remove(id);
            return "ignored";
        }

        self.track(&descriptor);
        match self.activate(&descriptor).await {
            Ok(()) => "replaced",
            Err(e) => {
                warn!("Failed to proxy {}: {}", descriptor.name, e);
                "failed"
            }
        }
    }
}
