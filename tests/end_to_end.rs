//! Integration coverage for the six end-to-end scenarios the reconciler
//! must satisfy, driven entirely through the public API against the fake
//! engine and in-memory registry.

use std::sync::Arc;
use std::time::Duration;

use netmon_reconciler::config::Config;
use netmon_reconciler::delta;
use netmon_reconciler::engine::fake::FakeEngine;
use netmon_reconciler::engine::EngineDriver;
use netmon_reconciler::model::{Container, ContainerStatus, MonitorStatus};
use netmon_reconciler::reconcile::Reconciler;
use netmon_reconciler::registry::memory::MemoryRegistry;
use netmon_reconciler::registry::Registry;
use netmon_reconciler::transition::TransitionEngine;

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

fn eligible_container(uri: &str, id: &str, name: &str) -> Container {
    Container {
        uri: uri.to_string(),
        id: id.to_string(),
        name: name.to_string(),
        image: "app:latest".to_string(),
        project: None,
        status: ContainerStatus::Running,
    }
}

/// S1: an empty registry plus one eligible live container gains exactly
/// one running, attached companion after a single reconciler pass.
#[tokio::test]
async fn s1_first_pass_creates_a_monitor_for_a_new_container() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_container(eligible_container("u1", "abc", "/svc"));

    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

    reconciler.pass().await;
    transition.wait("abc").await;

    let monitors = registry.monitors_snapshot();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].status, MonitorStatus::Running);
    assert_eq!(monitors[0].docker_container, "u1");
    assert!(engine.is_attached(&monitors[0].id, "logstash-net"));
    assert!(engine.contains(&monitors[0].id));
}

/// S2: the companion crashing is observed through the registry's mirror of
/// its own status (not the logged container's); the next pass enqueues
/// `RestartMonitor` and replaces it with a fresh, running companion.
#[tokio::test]
async fn s2_externally_killed_companion_is_restarted() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_container(eligible_container("u1", "abc", "/svc"));

    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

    reconciler.pass().await;
    transition.wait("abc").await;
    let first_monitor = registry.monitors_snapshot().into_iter().next().unwrap();

    engine.kill(&first_monitor.id);
    registry.set_companion_status(&first_monitor.id, ContainerStatus::Exited);

    reconciler.pass().await;
    transition.wait("abc").await;

    let monitors = registry.monitors_snapshot();
    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].status, MonitorStatus::Running);
    assert_ne!(monitors[0].id, first_monitor.id);
    assert!(!engine.contains(&first_monitor.id));
    assert!(engine.contains(&monitors[0].id));
}

/// S3: a delta reporting the logged container as exited removes its
/// companion and the monitor record.
#[tokio::test]
async fn s3_exited_delta_removes_the_monitor() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_container(eligible_container("u1", "abc", "/svc"));
    registry.seed_state("state1", "u1");

    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

    reconciler.pass().await;
    transition.wait("abc").await;
    let monitor_id = registry.monitors_snapshot().into_iter().next().unwrap().id;

    let registry_dyn: Arc<dyn Registry> = registry.clone();
    let body = br#"[{"inserts":[{"subject":"state1","predicate":"docker:status","object":"exited"}]},{"deletes":[]}]"#;
    delta::handle_delta(body, &registry_dyn, &transition).await;
    transition.wait("abc").await;

    assert!(registry.monitors_snapshot().is_empty());
    assert!(!engine.contains(&monitor_id));
}

/// S4: two rapid deltas for the same container (`created` then `exited`)
/// enqueue in order and settle with no companion and no monitor record,
/// proving the per-container queue is strictly FIFO.
#[tokio::test]
async fn s4_rapid_create_then_exit_deltas_settle_to_nothing() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_container(Container {
        status: ContainerStatus::None,
        ..eligible_container("u1", "abc", "/svc")
    });
    registry.seed_state("state1", "u1");

    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let registry_dyn: Arc<dyn Registry> = registry.clone();

    let created = br#"[{"inserts":[{"subject":"state1","predicate":"docker:status","object":"created"}]},{"deletes":[]}]"#;
    let exited = br#"[{"inserts":[{"subject":"state1","predicate":"docker:status","object":"exited"}]},{"deletes":[]}]"#;

    delta::handle_delta(created, &registry_dyn, &transition).await;
    delta::handle_delta(exited, &registry_dyn, &transition).await;
    transition.wait("abc").await;

    assert!(registry.monitors_snapshot().is_empty());
    assert_eq!(engine.running_ids_with_label("mu.semte.ch.networkMonitor", "u1").len(), 0);
}

/// S5: the engine reporting the companion already gone (404-equivalent)
/// on removal is not an error; the monitor record is still deleted.
#[tokio::test]
async fn s5_engine_not_found_on_remove_still_deletes_the_record() {
    let registry = Arc::new(MemoryRegistry::new());
    registry.seed_container(eligible_container("u1", "abc", "/svc"));

    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

    reconciler.pass().await;
    transition.wait("abc").await;
    let monitor = registry.find_by_logged_container("u1").await.unwrap().unwrap();

    // the companion disappears from the engine's view before the removal
    // action runs, simulating an out-of-band cleanup racing the reconciler.
    engine
        .remove(&netmon_reconciler::engine::ContainerHandle::new(monitor.id.clone()), true)
        .await
        .ok();

    let container = registry.get_logged_container(&monitor).await.unwrap().unwrap();
    transition.enqueue(
        container.id.clone(),
        netmon_reconciler::transition::Action::RemoveMonitor { container, monitor },
    );
    transition.wait("abc").await;

    assert!(registry.monitors_snapshot().is_empty());
}

/// S6: shutdown drains every running monitor before the process would
/// exit. Mirrors the lifecycle controller's shutdown sequence without
/// spinning up the HTTP listener.
#[tokio::test]
async fn s6_shutdown_drains_all_running_monitors() {
    let registry = Arc::new(MemoryRegistry::new());
    let engine = Arc::new(FakeEngine::new());
    let transition = TransitionEngine::new(engine.clone(), registry.clone(), test_config());
    let reconciler = Reconciler::new(registry.clone(), transition.clone(), Duration::from_secs(60));

    for n in 0..3 {
        let uri = format!("u{n}");
        let id = format!("c{n}");
        registry.seed_container(eligible_container(&uri, &id, &format!("/svc{n}")));
    }
    reconciler.pass().await;
    for n in 0..3 {
        transition.wait(&format!("c{n}")).await;
    }
    assert_eq!(registry.monitors_snapshot().len(), 3);

    let running = registry
        .find_all(Some(MonitorStatus::Running))
        .await
        .unwrap();
    assert_eq!(running.len(), 3);

    for monitor in running {
        let container = registry
            .get_logged_container(&monitor)
            .await
            .unwrap()
            .expect("logged container still present");
        transition.enqueue(
            container.id.clone(),
            netmon_reconciler::transition::Action::RemoveMonitor { container, monitor },
        );
    }

    let drained = transition.shutdown_drain(Duration::from_secs(5)).await;

    assert!(drained);
    assert!(registry.monitors_snapshot().is_empty());
    assert_eq!(engine.running_ids_with_label("mu.semte.ch.networkMonitor", "u0").len(), 0);
    assert_eq!(engine.running_ids_with_label("mu.semte.ch.networkMonitor", "u1").len(), 0);
    assert_eq!(engine.running_ids_with_label("mu.semte.ch.networkMonitor", "u2").len(), 0);
}
