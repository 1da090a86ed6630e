use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskRow, TaskStatus, TaskType, TaskUpdate};
use crate::types::AppResult;

/// Persistence for task status records.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task_type: TaskType, user_id: Uuid) -> AppResult<Task>;

    async fn find(&self, task_id: Uuid) -> AppResult<Option<Task>>;

    /// Lookup scoped to the owning user; other users' tasks are invisible.
    async fn find_for_user(&self, task_id: Uuid, user_id: Uuid) -> AppResult<Option<Task>>;

    /// Apply a status change to a task that has not finished yet. `None` when
    /// the task is missing or already `completed`/`failed`; terminal statuses
    /// never change again.
    async fn update_status(&self, update: &TaskUpdate) -> AppResult<Option<Task>>;

    /// Atomically move a `pending` task to `processing`. `None` when the task
    /// is missing or already past `pending`.
    async fn claim(&self, task_id: Uuid) -> AppResult<Option<Task>>;

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Task>>;

    /// Fail every `processing` task last touched before `cutoff`.
    async fn fail_stale(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64>;
}

const TASK_COLUMNS: &str =
    "id, task_type, status, user_id, created_at, updated_at, error_message, result_id";

pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn insert(&self, task_type: TaskType, user_id: Uuid) -> AppResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            INSERT INTO tasks (id, task_type, status, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(task_type.as_str())
        .bind(TaskStatus::Pending.as_str())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find(&self, task_id: Uuid) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn find_for_user(&self, task_id: Uuid, user_id: Uuid) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update_status(&self, update: &TaskUpdate) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET status = $2,
                error_message = $3,
                result_id = COALESCE($4, result_id),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(update.task_id)
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .bind(update.result_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn claim(&self, task_id: Uuid) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
