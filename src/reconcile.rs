//! The reconciler: a periodic sweep diffing live eligible containers
//! against persisted monitor records and enqueuing corrective actions.
//! Grounded on `cmd/root.rs`'s periodic status-sync task (a
//! `tokio::time::interval` inside a `tokio::select! { _ =
//! token.cancelled() => ..., _ = interval.tick() => ... }` loop),
//! generalized from a fixed 30-second constant to a configured period.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::MonitorStatus;
use crate::registry::Registry;
use crate::transition::{Action, TransitionEngine};

pub struct Reconciler {
    registry: Arc<dyn Registry>,
    transition: Arc<TransitionEngine>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn Registry>, transition: Arc<TransitionEngine>, interval: Duration) -> Self {
        Self {
            registry,
            transition,
            interval,
        }
    }

    /// Spawn the periodic sweep, returning only once `token` is cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("reconciler loop stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        self.pass().await;
                    }
                }
            }
        })
    }

    /// Run one diff/sweep pass, enqueuing corrective actions without
    /// awaiting their completion.
    pub async fn pass(&self) {
        let mut running = match self.registry.find_all(Some(MonitorStatus::Running)).await {
            Ok(m) => m,
            Err(e) => {
                warn!("reconciler: find_all failed: {}", e);
                return;
            }
        };

        let containers = match self.registry.eligible_containers().await {
            Ok(c) => c,
            Err(e) => {
                warn!("reconciler: eligible_containers failed: {}", e);
                return;
            }
        };

        for container in containers {
            if let Some(pos) = running.iter().position(|m| m.docker_container == container.uri) {
                let monitor = running.remove(pos);
                let status = match self.registry.container_status(&monitor).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("reconciler: container_status failed for {}: {}", monitor.uri, e);
                        continue;
                    }
                };

                if !status.is_alive() {
                    self.transition.enqueue(
                        container.id.clone(),
                        Action::RestartMonitor { container, monitor },
                    );
                }
            } else {
                self.transition
                    .enqueue(container.id.clone(), Action::CreateMonitor { container });
            }
        }

        for monitor in running {
            match self.registry.get_logged_container(&monitor).await {
                Ok(Some(container)) => {
                    self.transition
                        .enqueue(container.id.clone(), Action::RemoveMonitor { container, monitor });
                }
                Ok(None) => {
                    if let Err(e) = self.registry.remove(&monitor).await {
                        warn!("reconciler: orphan monitor cleanup failed for {}: {}", monitor.uri, e);
                    }
                }
                Err(e) => {
                    warn!("reconciler: get_logged_container failed for {}: {}", monitor.uri, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::fake::FakeEngine;
    use crate::model::{Container, ContainerStatus};
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

    #[tokio::test]
    async fn pass_creates_monitor_for_new_eligible_container() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.seed_container(Container {
            uri: "u1".to_string(),
            id: "abc".to_string(),
            name: "svc".to_string(),
            image: "app:latest".to_string(),
            project: None,
            status: ContainerStatus::Running,
        });

        let engine = Arc::new(FakeEngine::new());
        let transition = TransitionEngine::new(engine, registry.clone(), test_config());
        let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

        reconciler.pass().await;
        transition.wait("abc").await;

        assert_eq!(registry.monitors_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn second_pass_with_no_change_enqueues_nothing_new() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.seed_container(Container {
            uri: "u1".to_string(),
            id: "abc".to_string(),
            name: "svc".to_string(),
            image: "app:latest".to_string(),
            project: None,
            status: ContainerStatus::Running,
        });

        let engine = Arc::new(FakeEngine::new());
        let transition = TransitionEngine::new(engine, registry.clone(), test_config());
        let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

        reconciler.pass().await;
        transition.wait("abc").await;
        let after_first = registry.monitors_snapshot();

        reconciler.pass().await;
        transition.wait("abc").await;
        let after_second = registry.monitors_snapshot();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn container_leaving_eligibility_orphans_and_removes_its_monitor() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.seed_container(Container {
            uri: "u1".to_string(),
            id: "abc".to_string(),
            name: "svc".to_string(),
            image: "app:latest".to_string(),
            project: None,
            status: ContainerStatus::Running,
        });

        let engine = Arc::new(FakeEngine::new());
        let transition = TransitionEngine::new(engine, registry.clone(), test_config());
        let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

        reconciler.pass().await;
        transition.wait("abc").await;
        assert_eq!(registry.monitors_snapshot().len(), 1);

        // the logged container stops, dropping out of eligible_containers();
        // its monitor is now an orphan from the reconciler's point of view.
        registry.set_container_status("u1", ContainerStatus::Exited);

        reconciler.pass().await;
        transition.wait("abc").await;

        assert!(registry.monitors_snapshot().is_empty());
    }
}
