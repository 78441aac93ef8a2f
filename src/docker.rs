//! Docker implementation of the container directory.
//!
//! Wraps [bollard](https://crates.io/crates/bollard) and resolves the wire
//! API's quirks at this boundary: empty address strings become absent
//! addresses, raw event messages are classified into [`ChangeEvent`]s, and
//! the bare names carried by event attributes are canonicalized to the
//! runtime's `/name` form.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerInspectResponse, EndpointSettings, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::directory::{ChangeEvent, ContainerDirectory, ContainerInfo, EventStream, NetworkAttachment};
use crate::error::{Error, Result};

/// Buffered events between the forwarder task and the engine.
const EVENT_BUFFER: usize = 128;

pub struct DockerDirectory {
    docker: Docker,
}

impl DockerDirectory {
    /// Connect to the local Docker daemon using default settings. This
    /// handles the unix socket on Linux.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerDirectory for DockerDirectory {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(opts)).await?;

        let mut containers = Vec::new();
        for summary in summaries {
            let name = match summary.names.as_ref().and_then(|n| n.first()) {
                Some(name) => name.clone(),
                None => {
                    debug!("skipping unnamed container {:?}", summary.id);
                    continue;
                }
            };
            let networks = summary
                .network_settings
                .and_then(|s| s.networks)
                .map(convert_networks)
                .unwrap_or_default();
            containers.push(ContainerInfo { name, networks });
        }
        Ok(containers)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let detail = self.docker.inspect_container(id, None).await?;
        Ok(info_from_inspect(detail))
    }

    async fn subscribe_events(&self) -> Result<EventStream> {
        // The event stream is lazy; ping first so an unreachable daemon
        // fails the subscribe call instead of the first read.
        self.docker.ping().await?;

        let opts = EventsOptions::<String> {
            filters: [
                ("type", ["container", "network"].as_slice()),
                ("event", ["connect", "disconnect", "rename"].as_slice()),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect(),
            ..Default::default()
        };

        let docker = self.docker.clone();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut stream = docker.events(Some(opts));
            while let Some(message) = stream.next().await {
                match message {
                    Ok(message) => {
                        let Some(event) = classify(&message) else {
                            debug!("ignoring event {:?}", message.action);
                            continue;
                        };
                        let Some(change) = resolve_event(&docker, event).await else {
                            continue;
                        };
                        if tx.send(Ok(change)).await.is_err() {
                            // Subscriber is gone; stop pumping.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Error::stream(e.to_string()))).await;
                        return;
                    }
                }
            }
            // Stream ended without an error; dropping the sender closes
            // the channel, which the engine treats the same way.
        });
        Ok(rx)
    }
}

/// A recognized raw event, before container state is attached.
#[derive(Debug, PartialEq, Eq)]
enum RawEvent {
    Connect { container_id: String },
    Disconnect { container_id: String },
    Rename { container_id: String, old_name: String },
}

/// Classify a raw engine message. Returns `None` for anything that is not
/// a complete connect/disconnect/rename, which the caller drops without a
/// state change.
fn classify(message: &EventMessage) -> Option<RawEvent> {
    let action = message.action.as_deref()?;
    let actor = message.actor.as_ref()?;
    let attributes = actor.attributes.as_ref();
    match action {
        // Network events: the actor is the network, the container id is
        // in the attributes.
        "connect" => Some(RawEvent::Connect {
            container_id: attributes?.get("container")?.clone(),
        }),
        "disconnect" => Some(RawEvent::Disconnect {
            container_id: attributes?.get("container")?.clone(),
        }),
        // Container events: the actor is the container itself.
        "rename" => Some(RawEvent::Rename {
            container_id: actor.id.clone()?,
            old_name: attributes?.get("oldName")?.clone(),
        }),
        _ => None,
    }
}

/// Turn a raw event into a [`ChangeEvent`]. A rename needs the renamed
/// container's current state; if that inspect fails the event is dropped,
/// matching the engine's policy for its own inspect failures.
async fn resolve_event(docker: &Docker, event: RawEvent) -> Option<ChangeEvent> {
    match event {
        RawEvent::Connect { container_id } => Some(ChangeEvent::Connect { container_id }),
        RawEvent::Disconnect { container_id } => Some(ChangeEvent::Disconnect { container_id }),
        RawEvent::Rename {
            container_id,
            old_name,
        } => match docker.inspect_container(&container_id, None).await {
            Ok(detail) => {
                let info = info_from_inspect(detail);
                Some(ChangeEvent::Rename {
                    // Event attributes carry bare names; the API reports
                    // the path form.
                    old_name: format!("/{}", old_name.trim_start_matches('/')),
                    new_name: info.name,
                    networks: info.networks,
                })
            }
            Err(e) => {
                warn!("dropping rename event for {}: {}", container_id, e);
                None
            }
        },
    }
}

fn info_from_inspect(detail: ContainerInspectResponse) -> ContainerInfo {
    ContainerInfo {
        name: detail.name.unwrap_or_default(),
        networks: detail
            .network_settings
            .and_then(|s| s.networks)
            .map(convert_networks)
            .unwrap_or_default(),
    }
}

fn convert_networks(networks: HashMap<String, EndpointSettings>) -> HashMap<String, NetworkAttachment> {
    networks
        .into_iter()
        .map(|(name, endpoint)| {
            let attachment = NetworkAttachment {
                ipv4: parse_addr(endpoint.ip_address.as_deref()),
                ipv6: parse_addr(endpoint.global_ipv6_address.as_deref()),
            };
            (name, attachment)
        })
        .collect()
}

/// Parse an address string from the wire API, where "" means absent. An
/// unparseable non-empty value is logged and treated as absent rather than
/// producing a broken record.
fn parse_addr<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            warn!("ignoring unparseable address {:?}", raw);
            None
        }
    }
}
