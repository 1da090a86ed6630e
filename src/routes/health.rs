use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::warn;

use crate::db;
use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.pool {
        Some(pool) => match db::health_check(pool).await {
            Ok(_) => "connected",
            Err(e) => {
                warn!("Database health check failed: {}", e);
                "disconnected"
            }
        },
        None => "not configured",
    };

    let queue = match state.publisher.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!("Queue health check failed: {}", e);
            "disconnected"
        }
    };

    let healthy = database != "disconnected" && queue == "connected";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database: database.to_string(),
        queue: queue.to_string(),
    };

    (status, Json(response))
}
