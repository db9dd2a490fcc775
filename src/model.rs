//! Plain data types shared by the engine driver, the registry, and the
//! transition engine.

use serde::{Deserialize, Serialize};

/// Label key stamped onto every companion container, and checked by the
/// delta handler to tell a monitor's own container apart from a logged
/// application container.
pub const MONITOR_LABEL_KEY: &str = "mu.semte.ch.networkMonitor";

/// Status of an application container as reported by the registry's mirror
/// of engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Removing,
    /// Status unknown or not yet observed.
    None,
}

impl ContainerStatus {
    /// Whether a container in this status is eligible to have a monitor.
    pub fn is_alive(self) -> bool {
        matches!(self, ContainerStatus::Running | ContainerStatus::Created)
    }
}

impl From<&str> for ContainerStatus {
    fn from(s: &str) -> Self {
        match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            "removing" => ContainerStatus::Removing,
            _ => ContainerStatus::None,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Removing => "removing",
            ContainerStatus::None => "none",
        };
        f.write_str(s)
    }
}

/// A read-only projection of an application container, as the registry
/// mirrors it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Stable identity in the registry (a URI).
    pub uri: String,
    /// Engine-assigned container id.
    pub id: String,
    /// Container name (without the leading `/` the engine sometimes adds).
    pub name: String,
    /// Image reference.
    pub image: String,
    /// `docker-compose` project label, if any.
    pub project: Option<String>,
    /// Current status, if known.
    pub status: ContainerStatus,
}

/// Status of a `Monitor` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Creating,
    Running,
    Removed,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MonitorStatus::Creating => "creating",
            MonitorStatus::Running => "running",
            MonitorStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// A network-monitor companion container record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Equal to the engine identifier of the companion container once
    /// running.
    pub id: String,
    /// Stable URI derived from `id` (see [`Monitor::uri_for`]).
    pub uri: String,
    pub status: MonitorStatus,
    /// URI of the `Container` this monitor watches.
    pub docker_container: String,
    /// Whether this record has been saved to the registry yet.
    pub persisted: bool,
}

impl Monitor {
    /// Build the canonical monitor URI for a companion container id.
    pub fn uri_for(companion_id: &str) -> String {
        format!("http://mu.semte.ch/network-monitors/{companion_id}")
    }

    pub fn new_creating(docker_container: String) -> Self {
        Self {
            id: String::new(),
            uri: String::new(),
            status: MonitorStatus::Creating,
            docker_container,
            persisted: false,
        }
    }

    pub fn mark_running(&mut self, companion_id: String) {
        self.uri = Self::uri_for(&companion_id);
        self.id = companion_id;
        self.status = MonitorStatus::Running;
    }
}
