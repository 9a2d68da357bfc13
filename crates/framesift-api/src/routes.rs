//! Router setup for each role.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::{DispatcherState, ExtractorState, QueryState, RegistryState};

/// Registry routes. `/get_available_extractor` is an alias of `/lease`.
/// `/update_status` takes its arguments as query parameters.
pub fn registry_router(state: RegistryState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::<RegistryState>))
        .route("/register", post(handlers::register))
        .route("/lease", get(handlers::lease))
        .route("/get_available_extractor", get(handlers::lease))
        .route("/release", post(handlers::release))
        .route("/update_status", post(handlers::update_status))
        .route("/status", get(handlers::status))
        .route("/status/{id}", get(handlers::worker_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn dispatcher_router(state: DispatcherState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::<DispatcherState>))
        .route("/process_video", post(handlers::process_video))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn extractor_router(state: ExtractorState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::<ExtractorState>))
        .route("/extract", post(handlers::extract))
        .route("/state", get(handlers::extractor_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn query_router(state: QueryState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::<QueryState>))
        .route("/search/text", post(handlers::search_text))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
