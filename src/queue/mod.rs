// Job queue: publishing from the API, consuming in the worker

use std::time::Duration;

use async_trait::async_trait;

use crate::types::AppResult;

pub mod jobs;
pub mod memory;
pub mod redis_queue;
pub mod workers;

pub use jobs::{decode_job, encode_job, ConceptJob};
pub use memory::MemoryJobQueue;
pub use redis_queue::RedisJobQueue;
pub use workers::Worker;

#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, job: &ConceptJob) -> AppResult<()>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> AppResult<()>;
}

#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Wait up to `timeout` for the next raw message.
    async fn next_message(&self, timeout: Duration) -> AppResult<Option<String>>;
}
