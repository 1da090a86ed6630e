//! API Routes
//!
//! - `/api/concepts/*` - Concept generation, refinement, lookup and deletion
//! - `/api/tasks` - Task history of the caller
//! - `/api/health` - Health checks

pub mod concepts;
pub mod health;
pub mod tasks;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server);

    Router::new()
        .merge(concepts::router(state.clone()))
        .merge(tasks::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
