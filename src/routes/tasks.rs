use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::middleware::AuthUser;
use crate::models::{AppState, ListQuery, TaskResponse};
use crate::types::AppResult;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks))
        .with_state(state)
}

async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<TaskResponse>>> {
    let tasks = state
        .tasks
        .list_tasks(user.user_id, query.clamped(DEFAULT_LIMIT, MAX_LIMIT))
        .await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}
