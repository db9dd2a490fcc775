//! Transition engine: one serialized FIFO queue per container id, unlimited
//! parallelism across containers. Grounded on `server/manager.rs`'s
//! `DashMap<String, Arc<Server>>` collection, generalized from "one map
//! entry per live server" to "one queue plus worker per container with
//! in-flight actions," and on `events/bus.rs`'s subscribe/notify shape for
//! the completion signal, narrowed from a fanned-out broadcast channel to
//! a per-key `tokio::sync::Notify` since completion here is scoped to one
//! container.

mod actions;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::Config;
use crate::engine::EngineDriver;
use crate::model::{Container, ContainerStatus, Monitor};
use crate::registry::Registry;

/// A lifecycle intent for a single logged container.
#[derive(Debug, Clone)]
pub enum Action {
    CreateMonitor { container: Container },
    RemoveMonitor { container: Container, monitor: Monitor },
    RestartMonitor { container: Container, monitor: Monitor },
    /// Reconcile a logged container's monitor against a freshly observed
    /// status, deciding create/remove/no-op at *execution* time rather
    /// than enqueue time. The delta handler can enqueue several of these
    /// for the same container before the first one runs — resolving the
    /// decision this late is what keeps that sequence correct, since an
    /// earlier queued action may have created or removed the monitor this
    /// one would otherwise have stale information about.
    SyncLoggedContainer { container: Container, status: ContainerStatus },
    /// Same idea for a status change reported against a container that is
    /// itself a monitor's companion.
    SyncMonitorHost { container_id: String, status: ContainerStatus },
}

struct QueueState {
    actions: VecDeque<Action>,
    processing: bool,
}

struct ContainerQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
}

impl ContainerQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                actions: VecDeque::new(),
                processing: false,
            }),
            notify: Arc::new(Notify::new()),
        }
    }
}

/// Per-container serialized action executor; the sole mutator of monitor
/// and companion-container state.
pub struct TransitionEngine {
    queues: DashMap<String, ContainerQueue>,
    engine: Arc<dyn EngineDriver>,
    registry: Arc<dyn Registry>,
    config: Arc<Config>,
}

impl TransitionEngine {
    pub fn new(engine: Arc<dyn EngineDriver>, registry: Arc<dyn Registry>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            queues: DashMap::new(),
            engine,
            registry,
            config,
        })
    }

    /// Append `action` to `container_id`'s queue. If the queue was idle,
    /// spawns a drain worker; otherwise the in-flight worker will pick it
    /// up.
    pub fn enqueue(self: &Arc<Self>, container_id: String, action: Action) {
        let should_spawn = {
            let queue = self
                .queues
                .entry(container_id.clone())
                .or_insert_with(ContainerQueue::new);
            let mut state = queue.state.lock();
            state.actions.push_back(action);
            if state.processing {
                false
            } else {
                state.processing = true;
                true
            }
        };

        if should_spawn {
            let this = self.clone();
            tokio::spawn(async move { this.drain(container_id).await });
        }
    }

    async fn drain(self: Arc<Self>, container_id: String) {
        loop {
            let action = {
                let queue = match self.queues.get(&container_id) {
                    Some(q) => q,
                    None => return,
                };
                let mut state = queue.state.lock();
                match state.actions.pop_front() {
                    Some(action) => action,
                    None => {
                        // Flip `processing` to false and wake waiters under
                        // the same lock: a concurrent `enqueue()` can only
                        // observe `processing == false` (and spawn a new
                        // drain task) strictly after this notification has
                        // already gone out, never before it — otherwise a
                        // `wait()` subscribed to the old task's notify could
                        // wake up believing the queue is idle while the new
                        // task's action is already in flight.
                        state.processing = false;
                        queue.notify.notify_waiters();
                        return;
                    }
                }
            };

            actions::execute_action(action, &self.engine, &self.registry, &self.config).await;
        }
    }

    /// Resolve immediately if `container_id`'s queue is idle, otherwise
    /// resolve once it next drains to empty.
    pub async fn wait(&self, container_id: &str) {
        let notify = match self.queues.get(container_id) {
            Some(q) => q.notify.clone(),
            None => return,
        };

        let notified = notify.notified();
        let busy = match self.queues.get(container_id) {
            Some(q) => q.state.lock().processing,
            None => false,
        };

        if !busy {
            return;
        }

        notified.await;
    }

    /// Wait for every container id with a known queue to drain, bounded by
    /// `deadline`. Returns `true` iff all queues settled in time.
    pub async fn shutdown_drain(&self, deadline: Duration) -> bool {
        let ids: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();
        debug!("draining {} container queues before shutdown", ids.len());

        let waits = ids.iter().map(|id| self.wait(id));
        tokio::time::timeout(deadline, futures_util::future::join_all(waits))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::model::ContainerStatus;
    use crate::registry::memory::MemoryRegistry;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            monitor_image: "monitor:latest".to_string(),
            capture_sync_interval_ms: 60_000,
            application_graph: "http://graph".to_string(),
            capture_container_filter: String::new(),
            logstash_network: "logstash-net".to_string(),
            capture_docker_socket: String::new(),
            registry_endpoint: "http://registry".to_string(),
            packetbeat_max_message_size: None,
            packetbeat_listen_ports: None,
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_deadline_secs: 5,
            debug: false,
        })
    }

    fn container(uri: &str, id: &str) -> Container {
        Container {
            uri: uri.to_string(),
            id: id.to_string(),
            name: "svc".to_string(),
            image: "app:latest".to_string(),
            project: None,
            status: ContainerStatus::Running,
        }
    }

    #[tokio::test]
    async fn create_then_wait_settles() {
        let engine = Arc::new(FakeEngine::new());
        engine.seed_running("abc", "svc", "app:latest");
        let registry = Arc::new(MemoryRegistry::new());
        let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());

        transition.enqueue(
            "abc".to_string(),
            Action::CreateMonitor {
                container: container("u1", "abc"),
            },
        );
        transition.wait("abc").await;

        let monitors = registry.monitors_snapshot();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].docker_container, "u1");
    }

    #[tokio::test]
    async fn actions_on_same_container_are_serialized() {
        let engine = Arc::new(FakeEngine::new());
        engine.seed_running("abc", "svc", "app:latest");
        let registry = Arc::new(MemoryRegistry::new());
        let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());

        let c = container("u1", "abc");
        transition.enqueue("abc".to_string(), Action::CreateMonitor { container: c.clone() });
        transition.wait("abc").await;

        let monitor = registry.find_by_logged_container("u1").await.unwrap().unwrap();
        transition.enqueue(
            "abc".to_string(),
            Action::RemoveMonitor {
                container: c.clone(),
                monitor: monitor.clone(),
            },
        );
        transition.enqueue("abc".to_string(), Action::CreateMonitor { container: c });
        transition.wait("abc").await;

        let monitors = registry.monitors_snapshot();
        assert_eq!(monitors.len(), 1);
        assert_ne!(monitors[0].id, monitor.id);
    }
}
