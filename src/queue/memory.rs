// In-process job queue used by tests and single-process runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::queue::{encode_job, ConceptJob, JobConsumer, JobPublisher};
use crate::types::{AppError, AppResult};

pub struct MemoryJobQueue {
    sender: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    unavailable: AtomicBool,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            unavailable: AtomicBool::new(false),
        }
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker outage: publishes and pings fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Push a raw payload, bypassing encoding.
    pub fn push_raw(&self, payload: impl Into<String>) -> AppResult<()> {
        self.sender
            .send(payload.into())
            .map_err(|_| AppError::ServiceUnavailable("queue closed".to_string()))
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::ServiceUnavailable("queue unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobPublisher for MemoryJobQueue {
    async fn publish(&self, job: &ConceptJob) -> AppResult<()> {
        self.check_available()?;
        self.push_raw(encode_job(job)?)
    }

    async fn ping(&self) -> AppResult<()> {
        self.check_available()
    }
}

#[async_trait]
impl JobConsumer for MemoryJobQueue {
    async fn next_message(&self, timeout: Duration) -> AppResult<Option<String>> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(message) => Ok(message),
            Err(_elapsed) => Ok(None),
        }
    }
}
