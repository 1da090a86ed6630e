//! Task status bookkeeping and detection of tasks that stopped making progress.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::TaskRepository;
use crate::models::{Task, TaskStatus, TaskType, TaskUpdate};
use crate::types::{AppError, AppResult};

pub const STALE_TASK_MESSAGE: &str = "Task timed out while processing";

#[derive(Clone)]
pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_task(&self, task_type: TaskType, user_id: Uuid) -> AppResult<Task> {
        let task = self.repo.insert(task_type, user_id).await?;
        info!(task_id = %task.id, %user_id, task_type = %task_type, "Task created");
        Ok(task)
    }

    /// Fetch a task owned by `user_id`. Foreign tasks are reported as missing.
    pub async fn get_task(&self, task_id: Uuid, user_id: Uuid) -> AppResult<Task> {
        self.repo
            .find_for_user(task_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {}", task_id)))
    }

    /// Apply a status change. `None` means the task is gone or already
    /// terminal; completed and failed tasks never change again.
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
        result_id: Option<Uuid>,
    ) -> AppResult<Option<Task>> {
        if status == TaskStatus::Completed && result_id.is_none() {
            let current = self.repo.find(task_id).await?;
            if current.and_then(|t| t.result_id).is_none() {
                return Err(AppError::Internal(format!(
                    "task {} cannot complete without a result",
                    task_id
                )));
            }
        }

        let task = self
            .repo
            .update_status(&TaskUpdate {
                task_id,
                status,
                error_message,
                result_id,
            })
            .await?;
        match &task {
            Some(_) => info!(%task_id, status = %status, "Task status updated"),
            None => warn!(%task_id, status = %status, "Task missing or already finished, status not changed"),
        }
        Ok(task)
    }

    pub async fn mark_completed(
        &self,
        task_id: Uuid,
        result_id: Uuid,
    ) -> AppResult<Option<Task>> {
        self.update_task_status(task_id, TaskStatus::Completed, None, Some(result_id))
            .await
    }

    pub async fn mark_failed(
        &self,
        task_id: Uuid,
        message: impl Into<String>,
    ) -> AppResult<Option<Task>> {
        self.update_task_status(task_id, TaskStatus::Failed, Some(message.into()), None)
            .await
    }

    /// Move a pending task to processing. `None` means another delivery
    /// already took it (or it never existed) and the job must be skipped.
    pub async fn claim_task(&self, task_id: Uuid) -> AppResult<Option<Task>> {
        self.repo.claim(task_id).await
    }

    pub async fn list_tasks(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Task>> {
        self.repo.list_for_user(user_id, limit).await
    }

    pub async fn fail_stale_tasks(&self, timeout: Duration) -> AppResult<u64> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| AppError::Internal(format!("invalid task timeout: {}", e)))?;
        self.repo
            .fail_stale(Utc::now() - timeout, STALE_TASK_MESSAGE)
            .await
    }
}

/// Background loop failing tasks stuck in `processing`, so that clients
/// polling a task always see it reach a terminal status.
pub struct StaleTaskSweeper {
    tasks: TaskService,
    poll_interval: Duration,
    timeout: Duration,
}

impl StaleTaskSweeper {
    pub fn new(tasks: TaskService, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            tasks,
            poll_interval,
            timeout,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting stale task sweeper with interval {:?}, timeout {:?}",
            self.poll_interval, self.timeout
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            match self.tasks.fail_stale_tasks(self.timeout).await {
                Ok(0) => {}
                Ok(count) => warn!(count, "Marked stale processing tasks as failed"),
                Err(e) => error!("Error sweeping stale tasks: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryTaskRepository;

    fn service() -> (TaskService, Arc<MemoryTaskRepository>) {
        let repo = Arc::new(MemoryTaskRepository::new());
        (TaskService::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn test_create_then_get_for_owner() {
        let (tasks, _) = service();
        let user = Uuid::new_v4();

        let task = tasks.create_task(TaskType::Generate, user).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let fetched = tasks.get_task(task.id, user).await.unwrap();
        assert_eq!(fetched.id, task.id);
    }

    #[tokio::test]
    async fn test_get_task_of_other_user_is_not_found() {
        let (tasks, _) = service();
        let task = tasks.create_task(TaskType::Generate, Uuid::new_v4()).await.unwrap();

        let result = tasks.get_task(task.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        let missing = tasks.get_task(Uuid::new_v4(), task.user_id).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_completion_requires_result() {
        let (tasks, _) = service();
        let task = tasks.create_task(TaskType::Generate, Uuid::new_v4()).await.unwrap();

        let result = tasks
            .update_task_status(task.id, TaskStatus::Completed, None, None)
            .await;
        assert!(result.is_err());

        let concept_id = Uuid::new_v4();
        let done = tasks.mark_completed(task.id, concept_id).await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result_id, Some(concept_id));
    }

    #[tokio::test]
    async fn test_mark_failed_records_message() {
        let (tasks, _) = service();
        let task = tasks.create_task(TaskType::Refine, Uuid::new_v4()).await.unwrap();

        let failed = tasks.mark_failed(task.id, "boom").await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_fail_stale_tasks_uses_timeout() {
        let (tasks, repo) = service();
        let task = tasks.create_task(TaskType::Generate, Uuid::new_v4()).await.unwrap();
        tasks.claim_task(task.id).await.unwrap();
        repo.set_updated_at(task.id, Utc::now() - chrono::Duration::minutes(30))
            .await;

        assert_eq!(tasks.fail_stale_tasks(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(tasks.fail_stale_tasks(Duration::from_secs(600)).await.unwrap(), 1);

        let task = tasks.get_task(task.id, task.user_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(STALE_TASK_MESSAGE));
    }

    #[tokio::test]
    async fn test_swept_task_cannot_complete_afterwards() {
        let (tasks, repo) = service();
        let task = tasks.create_task(TaskType::Generate, Uuid::new_v4()).await.unwrap();
        tasks.claim_task(task.id).await.unwrap();
        repo.set_updated_at(task.id, Utc::now() - chrono::Duration::hours(1))
            .await;
        assert_eq!(tasks.fail_stale_tasks(Duration::from_secs(600)).await.unwrap(), 1);

        let late = tasks.mark_completed(task.id, Uuid::new_v4()).await.unwrap();
        assert!(late.is_none());

        let task = tasks.get_task(task.id, task.user_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(STALE_TASK_MESSAGE));
        assert!(task.result_id.is_none());
    }
}
