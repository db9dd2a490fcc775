//! Engine driver: a thin async trait over the container engine.
//!
//! Every call is fallible; `404` ("not found") is normalized into
//! [`EngineError::NotFound`]. `403` ("already attached") on
//! `attach_network` is normalized all the way to `Ok(())` by the driver
//! itself (see `bollard_driver::attach_network`) since it's a terminal
//! success condition callers never need to distinguish from a fresh
//! attach.

mod bollard_driver;
pub mod fake;

pub use bollard_driver::BollardEngine;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ContainerStatus;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("engine call timed out")]
    Timeout,

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("{0}")]
    Other(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A handle to a container known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A container as the engine itself reports it (used only for readiness
/// and for the lifecycle controller's pre-flight checks).
#[derive(Debug, Clone)]
pub struct EngineContainer {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
}

/// Optional filters for `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub label: Option<(String, String)>,
    pub all: bool,
}

/// Specification for creating a companion container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// `NetworkMode = "container:{loggedContainer.id}"`.
    pub network_mode: String,
    pub cap_add: Vec<String>,
    pub open_stdin: bool,
}

#[async_trait]
pub trait EngineDriver: Send + Sync {
    /// List live containers (used only for readiness probing).
    async fn list(&self, filters: Option<ListFilters>) -> EngineResult<Vec<EngineContainer>>;

    /// Pull `image`; must not return until the pull's progress stream
    /// completes.
    async fn pull(&self, image: &str) -> EngineResult<()>;

    /// Create a companion container (not yet started).
    async fn create(&self, spec: ContainerSpec) -> EngineResult<ContainerHandle>;

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()>;

    /// Stop with a deadline; callers ignore failure.
    async fn stop(&self, handle: &ContainerHandle, deadline_secs: i64) -> EngineResult<()>;

    /// `NotFound` is a valid terminal state here, not an error to surface.
    async fn remove(&self, handle: &ContainerHandle, force: bool) -> EngineResult<()>;

    /// Already-attached (`403`) is normalized to `Ok(())` by the driver.
    async fn attach_network(&self, container_id: &str, network: &str) -> EngineResult<()>;

    async fn detach_network(&self, container_id: &str, network: &str) -> EngineResult<()>;

    /// Pure lookup; does not contact the engine.
    async fn get(&self, id: &str) -> EngineResult<ContainerHandle>;
}
