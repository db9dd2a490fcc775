//! Registry: persistence for `Monitor` records and read access to
//! `Container` state, backed by an external triple store.

mod sparql;
pub mod memory;

pub use sparql::SparqlRegistry;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Container, ContainerStatus, Monitor, MonitorStatus};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed registry response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[async_trait]
pub trait Registry: Send + Sync {
    /// All monitor records, optionally filtered by status.
    async fn find_all(&self, status: Option<MonitorStatus>) -> RegistryResult<Vec<Monitor>>;

    /// The running monitor watching the given logged container, if any.
    async fn find_by_logged_container(&self, uri: &str) -> RegistryResult<Option<Monitor>>;

    /// The monitor whose own companion container id matches `container_id`.
    async fn find_by_monitor_host(&self, container_id: &str) -> RegistryResult<Option<Monitor>>;

    /// Dereferences `monitor.docker_container` to a `Container` projection.
    async fn get_logged_container(&self, monitor: &Monitor) -> RegistryResult<Option<Container>>;

    /// Resolves the container owning a `docker:state` node, used by the
    /// delta handler to turn a status-change subject back into a
    /// `Container`.
    async fn find_container_by_state(&self, state_uri: &str) -> RegistryResult<Option<Container>>;

    /// The currently persisted status of the monitor's own companion
    /// container (not the logged container it watches) — this is what the
    /// reconciler reads to detect a crashed companion.
    async fn container_status(&self, monitor: &Monitor) -> RegistryResult<ContainerStatus>;

    /// Containers eligible for monitoring: running, matching the operator
    /// filter, and not themselves carrying the monitor label.
    async fn eligible_containers(&self) -> RegistryResult<Vec<Container>>;

    /// A label value attached to a container, by key.
    async fn label_value(&self, container_id: &str, key: &str) -> RegistryResult<Option<String>>;

    /// Insert if not yet persisted, otherwise overwrite all fields.
    async fn save(&self, monitor: &mut Monitor) -> RegistryResult<()>;

    /// Delete the record; tolerant of "already removed".
    async fn remove(&self, monitor: &Monitor) -> RegistryResult<()>;

    /// Whether the store currently answers queries.
    async fn is_ready(&self) -> bool;
}
