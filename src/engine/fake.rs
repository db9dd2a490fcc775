//! In-memory [`EngineDriver`] double for tests, grounded on the same
//! "swap the trait impl" shape `environment::traits::ProcessEnvironment`
//! exists to enable in the teacher codebase.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ContainerHandle, ContainerSpec, EngineContainer, EngineDriver, EngineError, EngineResult,
    ListFilters,
};
use crate::model::ContainerStatus;

#[derive(Debug, Clone)]
struct FakeContainer {
    status: ContainerStatus,
    image: String,
    labels: HashMap<String, String>,
    network: Option<String>,
}

/// A fake container engine backed by a counter and a map, for unit and
/// end-to-end tests.
#[derive(Default)]
pub struct FakeEngine {
    inner: Mutex<FakeEngineState>,
}

#[derive(Default)]
struct FakeEngineState {
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
    pulled_images: Vec<String>,
    fail_create: bool,
    fail_attach_network: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container as if already running in the engine (used to set
    /// up `CreateMonitor`/`RemoveMonitor` test fixtures).
    pub fn seed_running(&self, id: &str, name: &str, image: &str) {
        let mut state = self.inner.lock();
        state.containers.insert(
            id.to_string(),
            FakeContainer {
                status: ContainerStatus::Running,
                image: image.to_string(),
                labels: HashMap::new(),
                network: None,
            },
        );
        let _ = name;
    }

    pub fn kill(&self, id: &str) {
        if let Some(c) = self.inner.lock().containers.get_mut(id) {
            c.status = ContainerStatus::Exited;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().containers.contains_key(id)
    }

    pub fn status_of(&self, id: &str) -> Option<ContainerStatus> {
        self.inner.lock().containers.get(id).map(|c| c.status)
    }

    pub fn is_attached(&self, id: &str, network: &str) -> bool {
        self.inner
            .lock()
            .containers
            .get(id)
            .and_then(|c| c.network.as_deref())
            .map(|n| n == network)
            .unwrap_or(false)
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.inner.lock().pulled_images.clone()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.lock().fail_create = fail;
    }

    pub fn set_fail_attach_network(&self, fail: bool) {
        self.inner.lock().fail_attach_network = fail;
    }

    pub fn running_ids_with_label(&self, key: &str, value: &str) -> Vec<String> {
        self.inner
            .lock()
            .containers
            .iter()
            .filter(|(_, c)| c.labels.get(key).map(|v| v == value).unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl EngineDriver for FakeEngine {
    async fn list(&self, filters: Option<ListFilters>) -> EngineResult<Vec<EngineContainer>> {
        let state = self.inner.lock();
        let label_filter = filters.and_then(|f| f.label);

        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| {
                label_filter
                    .as_ref()
                    .map(|(k, v)| c.labels.get(k).map(|lv| lv == v).unwrap_or(false))
                    .unwrap_or(true)
            })
            .map(|(id, c)| EngineContainer {
                id: id.clone(),
                names: vec![],
                image: c.image.clone(),
                status: c.status,
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn pull(&self, image: &str) -> EngineResult<()> {
        self.inner.lock().pulled_images.push(image.to_string());
        Ok(())
    }

    async fn create(&self, spec: ContainerSpec) -> EngineResult<ContainerHandle> {
        let mut state = self.inner.lock();
        if state.fail_create {
            return Err(EngineError::Other("fake: create failed".into()));
        }

        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                status: ContainerStatus::Created,
                image: spec.image,
                labels: spec.labels,
                network: None,
            },
        );
        Ok(ContainerHandle::new(id))
    }

    async fn start(&self, handle: &ContainerHandle) -> EngineResult<()> {
        let mut state = self.inner.lock();
        match state.containers.get_mut(&handle.id) {
            Some(c) => {
                c.status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(EngineError::NotFound(handle.id.clone())),
        }
    }

    async fn stop(&self, handle: &ContainerHandle, _deadline_secs: i64) -> EngineResult<()> {
        if let Some(c) = self.inner.lock().containers.get_mut(&handle.id) {
            c.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle, _force: bool) -> EngineResult<()> {
        let mut state = self.inner.lock();
        match state.containers.remove(&handle.id) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(handle.id.clone())),
        }
    }

    async fn attach_network(&self, container_id: &str, network: &str) -> EngineResult<()> {
        let mut state = self.inner.lock();
        if state.fail_attach_network {
            return Err(EngineError::Other("fake: attach_network failed".into()));
        }
        if let Some(c) = state.containers.get_mut(container_id) {
            c.network = Some(network.to_string());
        }
        Ok(())
    }

    async fn detach_network(&self, container_id: &str, _network: &str) -> EngineResult<()> {
        if let Some(c) = self.inner.lock().containers.get_mut(container_id) {
            c.network = None;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> EngineResult<ContainerHandle> {
        Ok(ContainerHandle::new(id.to_string()))
    }
}
