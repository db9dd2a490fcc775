//! The reconciler's only HTTP surface: `POST /.mu/delta`. Grounded on
//! `router/mod.rs`'s `AppState`/`build_router` shape and
//! `router/handlers/system.rs`'s `State<AppState>` extractor handler,
//! narrowed from the teacher's REST-over-servers surface to a single
//! write endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Router, body::Bytes};
use tower_http::trace::TraceLayer;

use crate::delta;
use crate::registry::Registry;
use crate::transition::TransitionEngine;

const MAX_DELTA_BODY_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub transition: Arc<TransitionEngine>,
    pub exiting: Arc<AtomicBool>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/.mu/delta", post(handle_delta))
        .layer(DefaultBodyLimit::max(MAX_DELTA_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_delta(State(state): State<AppState>, body: Bytes) -> StatusCode {
    if state.exiting.load(Ordering::SeqCst) {
        return StatusCode::OK;
    }

    delta::handle_delta(&body, &state.registry, &state.transition).await;
    StatusCode::OK
}
