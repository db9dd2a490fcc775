//! Bootstrap, readiness waiting, and graceful shutdown. Grounded on
//! `cmd/root.rs`'s `run()`: same `axum_server::Handle` +
//! `graceful_shutdown(Some(Duration))` idiom, same `tokio::spawn` +
//! `CancellationToken` wiring for a background periodic task, generalized
//! to also drain the transition engine's in-flight containers before
//! deciding the process exit code.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::{BollardEngine, EngineDriver};
use crate::error::{ReconcilerError, Result};
use crate::http::{self, AppState};
use crate::model::MonitorStatus;
use crate::reconcile::Reconciler;
use crate::registry::{Registry, SparqlRegistry};
use crate::transition::{Action, TransitionEngine};

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run the reconciler end to end. Returns `true` if shutdown drained
/// cleanly within the configured deadline (exit code 0), `false`
/// otherwise (exit code 1).
pub async fn run(config: Config) -> Result<bool> {
    let config = Arc::new(config);

    let registry: Arc<dyn Registry> = Arc::new(SparqlRegistry::new(
        config.registry_endpoint.clone(),
        config.application_graph.clone(),
        config.capture_container_filter.clone(),
    )?);

    let engine: Arc<dyn EngineDriver> =
        Arc::new(BollardEngine::connect(&config.capture_docker_socket)?);

    wait_for_registry(&registry).await;
    wait_for_engine(&engine).await;
    pull_monitor_image(&engine, &config.monitor_image).await;

    let transition = TransitionEngine::new(engine, registry.clone(), config.clone());
    let reconciler_token = CancellationToken::new();
    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        transition.clone(),
        config.sync_interval(),
    ));
    let reconciler_handle = reconciler.clone().spawn(reconciler_token.clone());

    let exiting = Arc::new(AtomicBool::new(false));
    let state = AppState {
        registry: registry.clone(),
        transition: transition.clone(),
        exiting: exiting.clone(),
    };
    let app = http::build_router(state);

    let bind_addr: SocketAddr = config
        .address()
        .parse()
        .map_err(|e| ReconcilerError::Config(format!("invalid bind address {}: {}", config.address(), e)))?;

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    let shutdown_exiting = exiting.clone();
    let shutdown_token = reconciler_token.clone();
    let shutdown_registry = registry.clone();
    let shutdown_transition = transition.clone();
    let shutdown_deadline = config.shutdown_deadline();

    let drain_result = Arc::new(tokio::sync::Mutex::new(None::<bool>));
    let drain_result_writer = drain_result.clone();

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        warn!("shutdown signal received, draining monitors");

        shutdown_exiting.store(true, Ordering::SeqCst);
        shutdown_token.cancel();

        let drained = drain_running_monitors(&shutdown_registry, &shutdown_transition, shutdown_deadline).await;
        *drain_result_writer.lock().await = Some(drained);

        shutdown_handle.graceful_shutdown(Some(shutdown_deadline));
    });

    info!("serving delta feed on {}", bind_addr);
    axum_server::bind(bind_addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| ReconcilerError::Internal(format!("http server error: {e}")))?;

    let _ = reconciler_handle.await;
    Ok(drain_result.lock().await.unwrap_or(false))
}

async fn wait_for_registry(registry: &Arc<dyn Registry>) {
    loop {
        if registry.is_ready().await {
            info!("registry is ready");
            return;
        }
        warn!("registry not ready, retrying in {:?}", READINESS_POLL_INTERVAL);
        tokio::time::sleep(READINESS_POLL_INTERVAL).await;
    }
}

async fn wait_for_engine(engine: &Arc<dyn EngineDriver>) {
    loop {
        match engine.list(None).await {
            Ok(_) => {
                info!("engine is ready");
                return;
            }
            Err(e) => {
                warn!("engine not ready ({}), retrying in {:?}", e, READINESS_POLL_INTERVAL);
                tokio::time::sleep(READINESS_POLL_INTERVAL).await;
            }
        }
    }
}

async fn pull_monitor_image(engine: &Arc<dyn EngineDriver>, image: &str) {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    loop {
        match engine.pull(image).await {
            Ok(()) => {
                info!("pulled monitor image {}", image);
                return;
            }
            Err(e) => {
                let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
                error!("failed to pull {} ({}), retrying in {:?}", image, e, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn drain_running_monitors(
    registry: &Arc<dyn Registry>,
    transition: &Arc<TransitionEngine>,
    deadline: Duration,
) -> bool {
    let running = match registry.find_all(Some(MonitorStatus::Running)).await {
        Ok(m) => m,
        Err(e) => {
            error!("shutdown: failed to list running monitors: {}", e);
            return false;
        }
    };

    for monitor in running {
        match registry.get_logged_container(&monitor).await {
            Ok(Some(container)) => {
                transition.enqueue(container.id.clone(), Action::RemoveMonitor { container, monitor });
            }
            Ok(None) => {
                if let Err(e) = registry.remove(&monitor).await {
                    error!("shutdown: failed to remove orphan monitor {}: {}", monitor.uri, e);
                }
            }
            Err(e) => error!("shutdown: get_logged_container failed for {}: {}", monitor.uri, e),
        }
    }

    transition.shutdown_drain(deadline).await
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
}
