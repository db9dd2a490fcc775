//! The lifecycle actions a `TransitionEngine` queue executes:
//! `CreateMonitor`, `RemoveMonitor`, `RestartMonitor`, and the two
//! deferred-decision variants that resolve against live registry state at
//! execution time. Compensation on a failed create is awaited inline,
//! before the action returns — the drain loop treats an action as
//! complete the instant its `execute_action` future resolves, so any
//! cleanup that matters has to happen before that point.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::Action;
use crate::config::Config;
use crate::engine::{ContainerHandle, ContainerSpec, EngineDriver};
use crate::model::{Container, ContainerStatus, Monitor, MONITOR_LABEL_KEY};
use crate::registry::Registry;

pub async fn execute_action(
    action: Action,
    engine: &Arc<dyn EngineDriver>,
    registry: &Arc<dyn Registry>,
    config: &Config,
) {
    match action {
        Action::CreateMonitor { container } => create_monitor(&container, engine, registry, config).await,
        Action::RemoveMonitor { container, monitor } => {
            remove_monitor(&container, &monitor, engine, registry, config).await
        }
        Action::RestartMonitor { container, monitor } => {
            remove_monitor(&container, &monitor, engine, registry, config).await;
            create_monitor(&container, engine, registry, config).await;
        }
        Action::SyncLoggedContainer { container, status } => {
            sync_logged_container(&container, status, engine, registry, config).await
        }
        Action::SyncMonitorHost { container_id, status } => {
            sync_monitor_host(&container_id, status, engine, registry, config).await
        }
    }
}

/// Decide create/remove/no-op for a logged container given its freshly
/// observed status, re-resolving "does a monitor already exist" right now
/// rather than trusting whatever was true when this action was enqueued.
async fn sync_logged_container(
    container: &Container,
    status: ContainerStatus,
    engine: &Arc<dyn EngineDriver>,
    registry: &Arc<dyn Registry>,
    config: &Config,
) {
    let existing = match registry.find_by_logged_container(&container.uri).await {
        Ok(m) => m,
        Err(e) => {
            error!("sync_logged_container: lookup for {} failed: {}", container.uri, e);
            return;
        }
    };

    match (status.is_alive(), existing) {
        (true, None) => create_monitor(container, engine, registry, config).await,
        (false, Some(monitor)) => remove_monitor(container, &monitor, engine, registry, config).await,
        _ => {}
    }
}

/// Same decision, for a status change reported against a container that
/// is itself a monitor's companion: a companion going unhealthy restarts
/// the monitor for the container it watches.
async fn sync_monitor_host(
    container_id: &str,
    status: ContainerStatus,
    engine: &Arc<dyn EngineDriver>,
    registry: &Arc<dyn Registry>,
    config: &Config,
) {
    if status.is_alive() {
        return;
    }

    let monitor = match registry.find_by_monitor_host(container_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return,
        Err(e) => {
            error!("sync_monitor_host: lookup for {} failed: {}", container_id, e);
            return;
        }
    };

    let logged = match registry.get_logged_container(&monitor).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!("sync_monitor_host: monitor {} has no resolvable logged container", monitor.uri);
            return;
        }
        Err(e) => {
            error!("sync_monitor_host: get_logged_container for {} failed: {}", monitor.uri, e);
            return;
        }
    };

    remove_monitor(&logged, &monitor, engine, registry, config).await;
    create_monitor(&logged, engine, registry, config).await;
}

async fn build_spec(container: &Container, config: &Config, registry: &Arc<dyn Registry>) -> ContainerSpec {
    let mut labels = HashMap::new();
    labels.insert(MONITOR_LABEL_KEY.to_string(), container.uri.clone());

    let mut env = vec![
        "LOGSTASH_URL=logstash:5044".to_string(),
        format!("DOCKER_ID={}", container.id),
        format!("DOCKER_NAME={}", container.name),
        format!("DOCKER_IMAGE={}", container.image),
    ];

    if let Ok(Some(service)) = registry
        .label_value(&container.id, "com.docker.compose.service")
        .await
    {
        env.push(format!("COMPOSE_SERVICE={service}"));
    }
    if let Ok(Some(project)) = registry
        .label_value(&container.id, "com.docker.compose.project")
        .await
    {
        env.push(format!("COMPOSE_PROJECT={project}"));
    }
    if let Some(size) = &config.packetbeat_max_message_size {
        env.push(format!("PACKETBEAT_MAX_MESSAGE_SIZE={size}"));
    }
    if let Some(ports) = &config.packetbeat_listen_ports {
        env.push(format!("PACKETBEAT_LISTEN_PORTS={ports}"));
    }

    let name = format!("{}-monitor", container.name.trim_start_matches('/'));

    ContainerSpec {
        name,
        image: config.monitor_image.clone(),
        env,
        labels,
        network_mode: format!("container:{}", container.id),
        cap_add: vec!["NET_ADMIN".to_string(), "NET_RAW".to_string()],
        open_stdin: false,
    }
}

async fn compensate(engine: &Arc<dyn EngineDriver>, handle: ContainerHandle, network: String) {
    let _ = engine.detach_network(&handle.id, &network).await;
    if let Err(e) = engine.remove(&handle, true).await {
        warn!("compensation remove of {} failed: {}", handle.id, e);
    }
}

async fn create_monitor(
    container: &Container,
    engine: &Arc<dyn EngineDriver>,
    registry: &Arc<dyn Registry>,
    config: &Config,
) {
    match registry.find_by_logged_container(&container.uri).await {
        Ok(Some(_)) => {
            warn!(
                "create_monitor: {} already has a running monitor, skipping",
                container.uri
            );
            return;
        }
        Err(e) => {
            error!("create_monitor: registry lookup for {} failed: {}", container.uri, e);
            return;
        }
        Ok(None) => {}
    }

    let spec = build_spec(container, config, registry).await;

    let handle = match engine.create(spec).await {
        Ok(h) => h,
        Err(e) => {
            error!("create_monitor: create for {} failed: {}", container.uri, e);
            return;
        }
    };

    if let Err(e) = engine.start(&handle).await {
        error!("create_monitor: start of {} failed: {}", handle.id, e);
        compensate(engine, handle, config.logstash_network.clone()).await;
        return;
    }

    if let Err(e) = engine.attach_network(&handle.id, &config.logstash_network).await {
        error!("create_monitor: attach_network for {} failed: {}", handle.id, e);
        compensate(engine, handle, config.logstash_network.clone()).await;
        return;
    }

    let mut monitor = Monitor::new_creating(container.uri.clone());
    monitor.mark_running(handle.id.clone());

    if let Err(e) = registry.save(&mut monitor).await {
        error!("create_monitor: registry save for {} failed: {}", handle.id, e);
        compensate(engine, handle, config.logstash_network.clone()).await;
        return;
    }

    info!("created monitor {} for {}", monitor.id, container.uri);
}

async fn remove_monitor(
    container: &Container,
    monitor: &Monitor,
    engine: &Arc<dyn EngineDriver>,
    registry: &Arc<dyn Registry>,
    config: &Config,
) {
    match registry.find_by_logged_container(&container.uri).await {
        Ok(Some(current)) if current.id == monitor.id => {}
        _ => {
            warn!(
                "remove_monitor: {} no longer matches a running monitor, skipping",
                container.uri
            );
            return;
        }
    }

    let handle = ContainerHandle::new(monitor.id.clone());

    if let Err(e) = engine.stop(&handle, 3).await {
        warn!("remove_monitor: stop of {} failed (ignored): {}", handle.id, e);
    }

    match engine.remove(&handle, true).await {
        Ok(()) => {
            if let Err(e) = registry.remove(monitor).await {
                error!("remove_monitor: registry delete for {} failed: {}", monitor.uri, e);
            }
        }
        Err(crate::engine::EngineError::NotFound(_)) => {
            if let Err(e) = registry.remove(monitor).await {
                error!("remove_monitor: registry delete for {} failed: {}", monitor.uri, e);
            }
        }
        Err(e) => {
            error!("remove_monitor: remove of {} failed: {}", handle.id, e);
        }
    }

    if let Err(e) = engine.detach_network(&container.id, &config.logstash_network).await {
        warn!("remove_monitor: detach_network for {} failed (ignored): {}", container.id, e);
    }
}
