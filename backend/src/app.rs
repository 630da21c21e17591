//! Application state and HTTP router construction.
//!
//! Used by [HttpServerService](crate::services::http_server::HttpServerService)
//! to build the Axum app, and by router tests.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;
use crate::db::Database;
use crate::services::{ServicesManager, StreamSupervisor};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub stream: Arc<StreamSupervisor>,
    pub services: Arc<ServicesManager>,
}

/// Build the API router (/api/*) by merging all route builders registered
/// with [ServicesManagerBuilder::add_api_routes](crate::services::ServicesManagerBuilder::add_api_routes).
pub fn api_router(state: AppState) -> Router<AppState> {
    state.services.build_api_router(state.clone())
}

/// Build the full Axum router: /api, health, the segment directory mount,
/// layers, and the static frontend fallback.
pub async fn build_app(state: AppState) -> Router<()> {
    let config = state.config.clone();
    let api = api_router(state.clone());

    let index = config.static_dir.join("index.html");

    Router::new()
        .nest("/api", api)
        .merge(api::health::router())
        .nest_service(&config.hls_public_path, ServeDir::new(&config.hls_dir))
        .fallback_service(ServeDir::new(&config.static_dir).not_found_service(ServeFile::new(index)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
