//! Parsing and dispatch for the external delta feed: a two-element JSON
//! array where one element carries `inserts` and the other `deletes`
//! (ignored). Only `docker:status` triples drive lifecycle intents.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{ContainerStatus, MONITOR_LABEL_KEY};
use crate::registry::Registry;
use crate::transition::{Action, TransitionEngine};

const DOCKER_STATUS_PREDICATE: &str = "docker:status";

#[derive(Debug, Deserialize)]
struct DeltaMessage {
    #[serde(default)]
    inserts: Vec<Triple>,
}

#[derive(Debug, Clone, Deserialize)]
struct Triple {
    subject: String,
    predicate: String,
    object: String,
}

fn select_inserts(body: &Value) -> Option<Vec<Triple>> {
    let messages: Vec<DeltaMessage> = serde_json::from_value(body.clone()).ok()?;
    messages
        .into_iter()
        .find(|m| !m.inserts.is_empty())
        .map(|m| m.inserts)
        .or(Some(Vec::new()))
}

/// Parse and dispatch a delta payload. Never fails outwardly: a parse
/// error is logged with the raw body, matching the feed's "always 200"
/// contract.
pub async fn handle_delta(body: &[u8], registry: &Arc<dyn Registry>, transition: &Arc<TransitionEngine>) {
    let parsed: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("delta: invalid JSON body ({}): {}", e, String::from_utf8_lossy(body));
            return;
        }
    };

    let inserts = match select_inserts(&parsed) {
        Some(inserts) => inserts,
        None => {
            warn!("delta: malformed payload shape: {}", String::from_utf8_lossy(body));
            return;
        }
    };

    let mut seen = HashSet::new();
    for triple in inserts {
        if triple.predicate != DOCKER_STATUS_PREDICATE {
            continue;
        }
        if !seen.insert((triple.subject.clone(), triple.object.clone())) {
            continue;
        }
        process_status_change(triple, registry, transition).await;
    }
}

async fn process_status_change(triple: Triple, registry: &Arc<dyn Registry>, transition: &Arc<TransitionEngine>) {
    let new_status = ContainerStatus::from(triple.object.as_str());

    let container = match registry.find_container_by_state(&triple.subject).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!("delta: no container found for state node {}", triple.subject);
            return;
        }
        Err(e) => {
            warn!("delta: container lookup for {} failed: {}", triple.subject, e);
            return;
        }
    };

    let monitor_label = match registry.label_value(&container.id, MONITOR_LABEL_KEY).await {
        Ok(v) => v,
        Err(e) => {
            warn!("delta: label lookup for {} failed: {}", container.id, e);
            return;
        }
    };

    // Which branch to enqueue is decided here (identity/label are stable),
    // but whether a monitor currently exists is re-resolved inside the
    // action itself at execution time — see `Action::SyncLoggedContainer`
    // / `Action::SyncMonitorHost` — since back-to-back deltas for the same
    // container can enqueue before the first one has run.
    if monitor_label.is_none() {
        transition.enqueue(
            container.id.clone(),
            Action::SyncLoggedContainer {
                container,
                status: new_status,
            },
        );
        return;
    }

    // `container` here is the monitor's own companion container, not the
    // logged container it watches. The transition engine serializes by
    // container id, and the reconciler and `SyncLoggedContainer` both
    // queue on the *logged* container's id — queuing this one on the
    // companion's id instead would let a reconciler-driven restart for the
    // logged container race a delta-driven one on an unrelated queue.
    // Resolve the logged container up front so we enqueue on the same key.
    let monitor = match registry.find_by_monitor_host(&container.id).await {
        Ok(Some(m)) => m,
        Ok(None) => return,
        Err(e) => {
            warn!("delta: find_by_monitor_host for {} failed: {}", container.id, e);
            return;
        }
    };

    let logged_container = match registry.get_logged_container(&monitor).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!("delta: monitor {} has no resolvable logged container", monitor.uri);
            return;
        }
        Err(e) => {
            warn!("delta: get_logged_container for {} failed: {}", monitor.uri, e);
            return;
        }
    };

    transition.enqueue(
        logged_container.id,
        Action::SyncMonitorHost {
            container_id: container.id,
            status: new_status,
        },
    );
}
