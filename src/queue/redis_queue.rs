// Redis-backed job queue: LPUSH to publish, BRPOP to consume (FIFO)

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::queue::{encode_job, ConceptJob, JobConsumer, JobPublisher};
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisJobQueue {
    connection: ConnectionManager,
    queue_name: String,
}

fn map_redis_error(error: redis::RedisError) -> AppError {
    AppError::ServiceUnavailable(format!("Redis error: {}", error))
}

impl RedisJobQueue {
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(map_redis_error)?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;
        info!(queue = %config.queue_name, "Connected to Redis job queue");

        Ok(Self {
            connection,
            queue_name: config.queue_name.clone(),
        })
    }
}

#[async_trait]
impl JobPublisher for RedisJobQueue {
    async fn publish(&self, job: &ConceptJob) -> AppResult<()> {
        let payload = encode_job(job)?;
        let mut connection = self.connection.clone();
        let depth: i64 = connection
            .lpush(&self.queue_name, payload)
            .await
            .map_err(map_redis_error)?;
        debug!(task_id = %job.task_id, depth, "Published job");
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let mut connection = self.connection.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

#[async_trait]
impl JobConsumer for RedisJobQueue {
    async fn next_message(&self, timeout: Duration) -> AppResult<Option<String>> {
        let mut connection = self.connection.clone();
        let popped: Option<(String, String)> = connection
            .brpop(&self.queue_name, timeout.as_secs_f64())
            .await
            .map_err(map_redis_error)?;
        Ok(popped.map(|(_queue, payload)| payload))
    }
}
