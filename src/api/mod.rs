//! HTTP and WebSocket surface
//!
//! Thin axum layer over the store, dispatcher, and orchestrator; handlers
//! hold no state of their own.

pub mod handlers;
pub mod ws;

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::events::JobEventBus;
use crate::jobs::JobOrchestrator;
use crate::store::StateStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub events: JobEventBus,
    pub config: Arc<AppConfig>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/submit", post(handlers::submit_job))
        .route("/jobs", get(handlers::get_jobs))
        .route("/jobs/{job_id}", get(handlers::get_job))
        .route("/stats", get(handlers::get_stats))
        .route("/workers", get(handlers::get_workers))
        .route("/workers/add", post(handlers::add_worker))
        .route("/workers/remove", post(handlers::remove_worker))
        .route(
            "/preferences/purifier",
            get(handlers::get_purifier_preference).post(handlers::set_purifier_preference),
        )
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
