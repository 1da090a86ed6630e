use sqlx::postgres::{PgPool, PgPoolOptions};
use crate::config::DatabaseConfig;
use anyhow::Result;

pub mod concepts;
pub mod memory;
pub mod tasks;

pub use concepts::{ConceptRepository, PgConceptRepository};
pub use memory::{MemoryConceptRepository, MemoryTaskRepository};
pub use tasks::{PgTaskRepository, TaskRepository};

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(&config.url)
        .await?;

    // Test connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await?;

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> anyhow::Result<bool> {
    let _result = sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await?;

    Ok(true)
}
