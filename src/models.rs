use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::middleware::rate_limiter::UserRateLimiter;
use crate::queue::JobPublisher;
use crate::services::{ConceptService, TaskService};
use crate::types::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub tasks: TaskService,
    pub concepts: ConceptService,
    pub publisher: Arc<dyn JobPublisher>,
    pub rate_limiter: Option<Arc<UserRateLimiter>>,
    /// Only used by the health check; repositories hold their own handles.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        tasks: TaskService,
        concepts: ConceptService,
        publisher: Arc<dyn JobPublisher>,
    ) -> Self {
        let rate_limiter =
            crate::middleware::rate_limiter::build_limiter(config.rate_limit.requests_per_minute);
        Self {
            config,
            tasks,
            concepts,
            publisher,
            rate_limiter,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

// Task bookkeeping

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Generate,
    Refine,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Generate => "generate",
            TaskType::Refine => "refine",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(TaskType::Generate),
            "refine" => Ok(TaskType::Refine),
            other => Err(AppError::Internal(format!("unknown task type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(AppError::Internal(format!("unknown task status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub result_id: Option<Uuid>,
}

/// Raw `tasks` row; enum columns are stored as checked TEXT.
#[derive(Debug, sqlx::FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub task_type: String,
    pub status: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub result_id: Option<Uuid>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            task_type: row.task_type.parse()?,
            status: row.status.parse()?,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            error_message: row.error_message,
            result_id: row.result_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub result_id: Option<Uuid>,
}

// Concepts and their colour variations

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Concept {
    pub id: Uuid,
    pub user_id: Uuid,
    pub logo_description: String,
    pub theme_description: String,
    pub image_path: String,
    pub refined_from: Option<Uuid>,
    pub refinement_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ColorVariation {
    pub id: Uuid,
    pub concept_id: Uuid,
    /// Order the palette was generated in; listings sort by it.
    pub position: i32,
    pub palette_name: String,
    pub colors: Vec<String>,
    pub description: Option<String>,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

/// Concept row to insert. The id is chosen up front because storage paths embed it.
#[derive(Debug, Clone)]
pub struct NewConcept {
    pub id: Uuid,
    pub user_id: Uuid,
    pub logo_description: String,
    pub theme_description: String,
    pub image_path: String,
    pub refined_from: Option<Uuid>,
    pub refinement_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewColorVariation {
    pub position: i32,
    pub palette_name: String,
    pub colors: Vec<String>,
    pub description: Option<String>,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredConcept {
    pub concept: Concept,
    pub variations: Vec<ColorVariation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub name: String,
    pub colors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Normalise a `#RRGGBB` colour (the leading `#` is optional) to upper case.
pub fn normalize_hex_color(raw: &str) -> Option<String> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(format!("#{}", hex.to_ascii_uppercase()))
    } else {
        None
    }
}

// API Request/Response types

fn default_num_palettes() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateConceptRequest {
    #[validate(length(min = 5, max = 500))]
    pub logo_description: String,
    #[validate(length(min = 5, max = 500))]
    pub theme_description: String,
    #[serde(default = "default_num_palettes")]
    #[validate(range(min = 1, max = 7))]
    pub num_palettes: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefineConceptRequest {
    pub original_concept_id: Uuid,
    #[validate(length(min = 5, max = 500))]
    pub refinement_prompt: String,
    #[validate(length(min = 5, max = 500))]
    pub logo_description: Option<String>,
    #[validate(length(min = 5, max = 500))]
    pub theme_description: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub preserve_aspects: Vec<String>,
    #[serde(default = "default_num_palettes")]
    #[validate(range(min = 1, max = 7))]
    pub num_palettes: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn clamped(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorVariationResponse {
    pub id: Uuid,
    pub palette_name: String,
    pub colors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_path: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptResponse {
    pub id: Uuid,
    pub logo_description: String,
    pub theme_description: String,
    pub image_path: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refined_from: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinement_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub color_variations: Vec<ColorVariationResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<Uuid>,
    /// Present once the task has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConceptResponse>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            task_type: task.task_type,
            status: task.status,
            created_at: task.created_at,
            updated_at: task.updated_at,
            error_message: task.error_message,
            result_id: task.result_id,
            result: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteConceptsResponse {
    pub deleted_concepts: usize,
    pub deleted_variations: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub queue: String,
}
