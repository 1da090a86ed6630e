// Error taxonomy shared by the API layer and the worker

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Refinement failed: {0}")]
    Refinement(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_)
            | AppError::Generation(_)
            | AppError::Refinement(_)
            | AppError::Persistence(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transient failures of an external dependency. Only these are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ServiceUnavailable(_))
    }

    fn label(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database error",
            AppError::NotFound(_) => "Resource not found",
            AppError::Validation(_) => "Invalid request",
            AppError::ServiceUnavailable(_) => "Service unavailable",
            AppError::Generation(_) => "Generation failed",
            AppError::Refinement(_) => "Refinement failed",
            AppError::Persistence(_) => "Persistence failed",
            AppError::Auth(_) => "Unauthorized",
            AppError::RateLimited(_) => "Too many requests",
            AppError::Internal(_) => "Internal server error",
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        // Database internals are not echoed back to clients
        let details = match &self {
            AppError::Database(_) => "database operation failed".to_string(),
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": self.label(),
                "details": details,
            })),
        )
            .into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
