use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::middleware::{rate_limiter_middleware, AuthUser, ValidJson};
use crate::models::{
    AppState, ConceptResponse, DeleteConceptsResponse, GenerateConceptRequest, ListQuery,
    RefineConceptRequest, Task, TaskResponse, TaskStatus, TaskType,
};
use crate::queue::ConceptJob;
use crate::types::{AppError, AppResult};

const RECENT_DEFAULT_LIMIT: i64 = 10;
const RECENT_MAX_LIMIT: i64 = 50;

pub fn router(state: AppState) -> Router {
    // Only submissions count against the per-user quota
    let submissions = Router::new()
        .route("/api/concepts/generate-with-palettes", post(generate_with_palettes))
        .route("/api/concepts/refine", post(refine_concept))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limiter_middleware,
        ));

    Router::new()
        .merge(submissions)
        .route("/api/concepts", delete(delete_all_concepts))
        .route("/api/concepts/recent", get(recent_concepts))
        .route("/api/concepts/task/{task_id}", get(get_task_status))
        .route("/api/concepts/{concept_id}", get(get_concept))
        .with_state(state)
}

pub async fn generate_with_palettes(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<GenerateConceptRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    info!(user_id = %user.user_id, num_palettes = request.num_palettes, "Generation requested");

    let task = state
        .tasks
        .create_task(TaskType::Generate, user.user_id)
        .await?;
    let job = ConceptJob::generate(&task, &request);
    enqueue(&state, &task, &job).await?;

    Ok((StatusCode::ACCEPTED, Json(task.into())))
}

pub async fn refine_concept(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<RefineConceptRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    info!(
        user_id = %user.user_id,
        original_concept_id = %request.original_concept_id,
        "Refinement requested"
    );

    let original = state
        .concepts
        .find_owned(request.original_concept_id, user.user_id)
        .await?;

    let task = state
        .tasks
        .create_task(TaskType::Refine, user.user_id)
        .await?;
    let job = ConceptJob::refine(&task, &request, &original.concept);
    enqueue(&state, &task, &job).await?;

    Ok((StatusCode::ACCEPTED, Json(task.into())))
}

/// Publish the job; a task whose job never reached the queue is failed right away.
async fn enqueue(state: &AppState, task: &Task, job: &ConceptJob) -> AppResult<()> {
    let Err(e) = state.publisher.publish(job).await else {
        return Ok(());
    };

    error!(task_id = %task.id, error = %e, "Failed to publish job");
    if let Err(mark_err) = state
        .tasks
        .mark_failed(task.id, format!("Failed to enqueue task: {}", e))
        .await
    {
        error!(task_id = %task.id, error = %mark_err, "Failed to mark unpublished task as failed");
    }
    Err(AppError::ServiceUnavailable(
        "task queue is unavailable, please retry".to_string(),
    ))
}

pub async fn get_task_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskResponse>> {
    let task = state.tasks.get_task(task_id, user.user_id).await?;
    let result_id = task.result_id;
    let completed = task.status == TaskStatus::Completed;
    let mut response = TaskResponse::from(task);

    if let (true, Some(concept_id)) = (completed, result_id) {
        match state.concepts.get_concept(concept_id, user.user_id).await {
            Ok(concept) => response.result = Some(concept),
            // The concept may have been deleted since the task finished
            Err(AppError::NotFound(_)) => {
                warn!(%task_id, %concept_id, "Completed task points at a missing concept")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Json(response))
}

pub async fn get_concept(
    State(state): State<AppState>,
    user: AuthUser,
    Path(concept_id): Path<Uuid>,
) -> AppResult<Json<ConceptResponse>> {
    let concept = state.concepts.get_concept(concept_id, user.user_id).await?;
    Ok(Json(concept))
}

pub async fn recent_concepts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<ConceptResponse>>> {
    let limit = query.clamped(RECENT_DEFAULT_LIMIT, RECENT_MAX_LIMIT);
    let concepts = state.concepts.list_recent(user.user_id, limit).await?;
    Ok(Json(concepts))
}

pub async fn delete_all_concepts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DeleteConceptsResponse>> {
    let summary = state.concepts.delete_all_for_user(user.user_id).await?;
    Ok(Json(summary))
}
