//! In-memory [`Registry`] double, grounded on `database/mod.rs`'s
//! `Database::open_in_memory()` test-double pattern, generalized from
//! "in-memory SQLite" to plain in-memory vectors.

use parking_lot::Mutex;

use super::{Registry, RegistryResult};
use crate::model::{Container, ContainerStatus, Monitor, MonitorStatus};

#[derive(Default)]
pub struct MemoryRegistry {
    monitors: Mutex<Vec<Monitor>>,
    containers: Mutex<Vec<Container>>,
    labels: Mutex<Vec<(String, String, String)>>,
    states: Mutex<Vec<(String, String)>>,
    /// Mirrors the companion container's own live status, keyed by its
    /// engine id. Absent entries default to `running` — a companion is
    /// assumed healthy until something explicitly marks it otherwise.
    companion_status: Mutex<Vec<(String, ContainerStatus)>>,
    ready: Mutex<bool>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock() = ready;
    }

    pub fn seed_container(&self, container: Container) {
        self.containers.lock().push(container);
    }

    pub fn set_container_status(&self, uri: &str, status: ContainerStatus) {
        if let Some(c) = self.containers.lock().iter_mut().find(|c| c.uri == uri) {
            c.status = status;
        }
    }

    pub fn set_label(&self, container_id: &str, key: &str, value: &str) {
        self.labels
            .lock()
            .push((container_id.to_string(), key.to_string(), value.to_string()));
    }

    /// Register `state_uri` as the `docker:state` node of the container
    /// identified by `container_uri`.
    pub fn seed_state(&self, state_uri: &str, container_uri: &str) {
        self.states
            .lock()
            .push((state_uri.to_string(), container_uri.to_string()));
    }

    /// Mark a companion container's mirrored status, keyed by its own
    /// engine id. Used to simulate an externally-observed crash.
    pub fn set_companion_status(&self, companion_id: &str, status: ContainerStatus) {
        let mut statuses = self.companion_status.lock();
        match statuses.iter_mut().find(|(id, _)| id == companion_id) {
            Some((_, s)) => *s = status,
            None => statuses.push((companion_id.to_string(), status)),
        }
    }

    pub fn monitors_snapshot(&self) -> Vec<Monitor> {
        self.monitors.lock().clone()
    }
}

#[async_trait::async_trait]
impl Registry for MemoryRegistry {
    async fn find_all(&self, status: Option<MonitorStatus>) -> RegistryResult<Vec<Monitor>> {
        Ok(self
            .monitors
            .lock()
            .iter()
            .filter(|m| status.map(|s| m.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn find_by_logged_container(&self, uri: &str) -> RegistryResult<Option<Monitor>> {
        Ok(self
            .monitors
            .lock()
            .iter()
            .find(|m| m.docker_container == uri && m.status == MonitorStatus::Running)
            .cloned())
    }

    async fn find_by_monitor_host(&self, container_id: &str) -> RegistryResult<Option<Monitor>> {
        Ok(self
            .monitors
            .lock()
            .iter()
            .find(|m| m.id == container_id)
            .cloned())
    }

    async fn get_logged_container(&self, monitor: &Monitor) -> RegistryResult<Option<Container>> {
        Ok(self
            .containers
            .lock()
            .iter()
            .find(|c| c.uri == monitor.docker_container)
            .cloned())
    }

    async fn find_container_by_state(&self, state_uri: &str) -> RegistryResult<Option<Container>> {
        let container_uri = self
            .states
            .lock()
            .iter()
            .find(|(s, _)| s == state_uri)
            .map(|(_, c)| c.clone());

        Ok(match container_uri {
            Some(uri) => self.containers.lock().iter().find(|c| c.uri == uri).cloned(),
            None => None,
        })
    }

    async fn container_status(&self, monitor: &Monitor) -> RegistryResult<ContainerStatus> {
        Ok(self
            .companion_status
            .lock()
            .iter()
            .find(|(id, _)| id == &monitor.id)
            .map(|(_, s)| *s)
            .unwrap_or(ContainerStatus::Running))
    }

    async fn eligible_containers(&self) -> RegistryResult<Vec<Container>> {
        // Matches `SparqlRegistry`'s literal `docker:state/docker:status
        // "running"` filter (spec.md §4.2) — `running` only, not every
        // "alive" status.
        Ok(self
            .containers
            .lock()
            .iter()
            .filter(|c| c.status == ContainerStatus::Running)
            .cloned()
            .collect())
    }

    async fn label_value(&self, container_id: &str, key: &str) -> RegistryResult<Option<String>> {
        Ok(self
            .labels
            .lock()
            .iter()
            .find(|(id, k, _)| id == container_id && k == key)
            .map(|(_, _, v)| v.clone()))
    }

    async fn save(&self, monitor: &mut Monitor) -> RegistryResult<()> {
        let mut monitors = self.monitors.lock();
        if let Some(existing) = monitors.iter_mut().find(|m| m.uri == monitor.uri) {
            *existing = monitor.clone();
        } else {
            monitors.push(monitor.clone());
        }
        monitor.persisted = true;
        Ok(())
    }

    async fn remove(&self, monitor: &Monitor) -> RegistryResult<()> {
        self.monitors.lock().retain(|m| m.uri != monitor.uri);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        *self.ready.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_find_by_logged_container() {
        let registry = MemoryRegistry::new();
        let mut monitor = Monitor::new_creating("c1".to_string());
        monitor.docker_container = "u1".to_string();
        monitor.mark_running("c1".to_string());

        registry.save(&mut monitor).await.unwrap();
        assert!(monitor.persisted);

        let found = registry.find_by_logged_container("u1").await.unwrap();
        assert_eq!(found.unwrap().id, "c1");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = MemoryRegistry::new();
        let mut monitor = Monitor::new_creating("c1".to_string());
        monitor.docker_container = "u1".to_string();
        monitor.mark_running("c1".to_string());
        registry.save(&mut monitor).await.unwrap();

        registry.remove(&monitor).await.unwrap();
        registry.remove(&monitor).await.unwrap();

        assert!(registry.find_all(None).await.unwrap().is_empty());
    }
}
