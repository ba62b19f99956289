//! Docker-backed workload directory.

use super::types::{
    normalize_name, parse_port_key, DirectoryError, Event, PortSpec, WorkloadDescriptor,
};
use super::{EventStream, WorkloadDirectory};
use crate::config::{DaemonAddress, DaemonConfig};
use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, EventMessage};
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info, warn};

/// Workload directory backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerDirectory {
    client: Docker,
}

impl DockerDirectory {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Connect to the daemon described by `config`.
    ///
    /// This does not touch the network; call [`DockerDirectory::ping`] to
    /// check the daemon is reachable.
    pub fn connect(config: &DaemonConfig) -> Result<Self, DirectoryError> {
        let timeout = config.timeout_secs;
        let address =
            DaemonAddress::parse(&config.host).map_err(|e| DirectoryError::Transport(e.to_string()))?;

        let client = match (&address, &config.tls) {
            (DaemonAddress::Unix(path), _) => {
                Docker::connect_with_socket(path, timeout, API_DEFAULT_VERSION)
            }
            (DaemonAddress::Tcp(addr), Some(tls)) => Docker::connect_with_ssl(
                addr,
                Path::new(&tls.key_path),
                Path::new(&tls.cert_path),
                Path::new(&tls.ca_path),
                timeout,
                API_DEFAULT_VERSION,
            ),
            (DaemonAddress::Tcp(addr), None) => {
                Docker::connect_with_http(addr, timeout, API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| DirectoryError::Transport(format!("{}: {e}", config.host)))?;

        info!("Using Docker daemon at {}", config.host);
        Ok(Self::new(client))
    }

    /// Check the daemon answers.
    pub async fn ping(&self) -> Result<(), DirectoryError> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| DirectoryError::Transport(e.to_string()))
    }
}

#[async_trait]
impl WorkloadDirectory for DockerDirectory {
    async fn fetch_descriptor(&self, identity: &str) -> Result<WorkloadDescriptor, DirectoryError> {
        let response = self
            .client
            .inspect_container(identity, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => DirectoryError::NotFound(identity.to_string()),
                other => DirectoryError::Transport(other.to_string()),
            })?;

        descriptor_from_inspect(identity, response)
    }

    async fn subscribe_events(&self) -> Result<EventStream, DirectoryError> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let stream = self
            .client
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(DirectoryError::Transport(e.to_string()))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

/// Build a descriptor from an inspect response.
pub(crate) fn descriptor_from_inspect(
    identity: &str,
    response: ContainerInspectResponse,
) -> Result<WorkloadDescriptor, DirectoryError> {
    let invalid = |reason: &str| DirectoryError::InvalidDescriptor(identity.to_string(), reason.to_string());

    let id = response.id.ok_or_else(|| invalid("missing id"))?;
    let name = normalize_name(response.name.as_deref().unwrap_or_default()).to_string();
    let running = response
        .state
        .and_then(|state| state.running)
        .unwrap_or(false);

    let settings = response.network_settings.unwrap_or_default();

    // Default bridge first, then user-defined networks in name order
    let mut candidates: Vec<String> = settings.ip_address.clone().into_iter().collect();
    if let Some(networks) = &settings.networks {
        let mut names: Vec<&String> = networks.keys().collect();
        names.sort();
        candidates.extend(
            names
                .into_iter()
                .filter_map(|name| networks[name].ip_address.clone()),
        );
    }
    let address = match candidates.into_iter().find(|ip| !ip.is_empty()) {
        Some(ip) => Some(
            ip.parse::<IpAddr>()
                .map_err(|e| invalid(&format!("bad address '{ip}': {e}")))?,
        ),
        None => None,
    };

    let mut keys: Vec<String> = settings
        .ports
        .map(|ports| ports.into_keys().collect())
        .unwrap_or_default();
    if keys.is_empty() {
        keys = response
            .config
            .and_then(|config| config.exposed_ports)
            .map(|ports| ports.into_keys().collect())
            .unwrap_or_default();
    }

    let ports: BTreeSet<PortSpec> = keys
        .iter()
        .filter_map(|key| {
            let spec = parse_port_key(key);
            if spec.is_none() {
                warn!("Skipping unsupported port '{}' on {}", key, name);
            }
            spec
        })
        .collect();

    Ok(WorkloadDescriptor {
        id,
        name,
        running,
        address,
        ports,
    })
}

fn event_from_message(message: EventMessage) -> Option<Event> {
    let status = message.action?;
    let Some(workload_id) = message.actor.and_then(|actor| actor.id) else {
        debug!("Dropping '{}' event without actor id", status);
        return None;
    };
    Some(Event {
        workload_id,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState, EndpointSettings, EventActor, NetworkSettings};

    fn inspect(ip: &str, ports: &[&str]) -> ContainerInspectResponse {
        ContainerInspectResponse {
            id: Some("c0ffee".to_string()),
            name: Some("/web".to_string()),
            state: Some(ContainerState {
                running: Some(true),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                ip_address: Some(ip.to_string()),
                ports: Some(
                    ports
                        .iter()
                        .map(|key| (key.to_string(), None))
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_descriptor_from_inspect() {
        let descriptor =
            descriptor_from_inspect("web", inspect("172.17.0.2", &["80/tcp", "53/udp"])).unwrap();
        assert_eq!(descriptor.id, "c0ffee");
        assert_eq!(descriptor.name, "web");
        assert!(descriptor.running);
        assert_eq!(descriptor.address, Some("172.17.0.2".parse().unwrap()));
        assert_eq!(
            descriptor.ports.into_iter().collect::<Vec<_>>(),
            vec![PortSpec::udp(53), PortSpec::tcp(80)]
        );
    }

    #[test]
    fn test_descriptor_skips_unsupported_ports() {
        let descriptor =
            descriptor_from_inspect("web", inspect("172.17.0.2", &["80/tcp", "132/sctp"])).unwrap();
        assert_eq!(descriptor.ports.len(), 1);
    }

    #[test]
    fn test_descriptor_falls_back_to_network_and_exposed_ports() {
        let mut response = inspect("", &[]);
        let mut networks = HashMap::new();
        networks.insert(
            "backend".to_string(),
            EndpointSettings {
                ip_address: Some("10.0.0.5".to_string()),
                ..Default::default()
            },
        );
        if let Some(settings) = response.network_settings.as_mut() {
            settings.networks = Some(networks);
        }
        let mut exposed = HashMap::new();
        exposed.insert("6379/tcp".to_string(), HashMap::new());
        response.config = Some(ContainerConfig {
            exposed_ports: Some(exposed),
            ..Default::default()
        });

        let descriptor = descriptor_from_inspect("web", response).unwrap();
        assert_eq!(descriptor.address, Some("10.0.0.5".parse().unwrap()));
        assert!(descriptor.ports.contains(&PortSpec::tcp(6379)));
    }

    #[test]
    fn test_stopped_descriptor_has_no_address() {
        let mut response = inspect("", &[]);
        response.state = Some(ContainerState {
            running: Some(false),
            ..Default::default()
        });
        let descriptor = descriptor_from_inspect("web", response).unwrap();
        assert!(!descriptor.running);
        assert_eq!(descriptor.address, None);
    }

    #[test]
    fn test_descriptor_rejects_bad_address() {
        let err = descriptor_from_inspect("web", inspect("not-an-ip", &["80/tcp"])).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidDescriptor(..)));
    }

    #[test]
    fn test_event_from_message() {
        let message = EventMessage {
            action: Some("die".to_string()),
            actor: Some(EventActor {
                id: Some("c0ffee".to_string()),
                attributes: None,
            }),
            ..Default::default()
        };
        assert_eq!(event_from_message(message), Some(Event::new("c0ffee", "die")));

        let orphan = EventMessage {
            action: Some("start".to_string()),
            ..Default::default()
        };
        assert_eq!(event_from_message(orphan), None);
    }
}
