//! Data model for container state and the runtime seam.
//!
//! The [`ContainerDirectory`] trait is the only interface the
//! synchronization engine has to the container runtime. The production
//! implementation lives in [`crate::docker`]; tests drive the engine with
//! scripted in-memory directories.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// One container's presence on one virtual network.
///
/// The runtime API reports addresses as strings with "" meaning absent;
/// adapters resolve that at the boundary, so an address here is always a
/// usable one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

/// Immutable snapshot of one container as reported by the runtime.
///
/// `name` is the runtime's path form (`/web-1`).
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub name: String,
    /// Network name -> attachment. Keys are unique, order is irrelevant.
    pub networks: HashMap<String, NetworkAttachment>,
}

/// A discrete change to container network state.
///
/// Closed variant set: the subscription is filtered server-side to exactly
/// these actions, and anything else is dropped during classification, so
/// handling is exhaustive by construction.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A container joined a network. Carries the id to inspect for its
    /// current state.
    Connect { container_id: String },
    /// A container left a network.
    Disconnect { container_id: String },
    /// A container was renamed. Carries the attachments to publish under
    /// the new name; both names are in the runtime's `/name` form.
    Rename {
        old_name: String,
        new_name: String,
        networks: HashMap<String, NetworkAttachment>,
    },
}

/// Live feed of change events.
///
/// An `Err` item means the underlying stream hit a transport error; a
/// closed channel means it ended without one. The engine treats both as a
/// disruption.
pub type EventStream = mpsc::Receiver<Result<ChangeEvent>>;

/// The container runtime as the engine sees it.
#[async_trait]
pub trait ContainerDirectory: Send + Sync + 'static {
    /// The complete current set of running containers. Never partial: an
    /// error means no result.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Current state of a single container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Open a new event subscription. Fails fast when the runtime is
    /// unreachable.
    async fn subscribe_events(&self) -> Result<EventStream>;
}

#[async_trait]
impl<T: ContainerDirectory + ?Sized> ContainerDirectory for Arc<T> {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        (**self).list_containers().await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        (**self).inspect_container(id).await
    }

    async fn subscribe_events(&self) -> Result<EventStream> {
        (**self).subscribe_events().await
    }
}
