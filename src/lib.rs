// Concept Visualizer - logo concept generation API and background worker

pub mod ai;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
