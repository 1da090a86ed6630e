// Per-user rate limiting of job submissions

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::models::AppState;
use crate::types::AppError;

pub type UserRateLimiter = DefaultKeyedRateLimiter<Uuid>;

/// `None` when limiting is disabled (zero requests per minute).
pub fn build_limiter(requests_per_minute: u32) -> Option<Arc<UserRateLimiter>> {
    let per_minute = NonZeroU32::new(requests_per_minute)?;
    Some(Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))))
}

/// Periodically forget users whose quota has fully replenished, so the
/// per-user state does not grow with every user ever seen.
pub fn spawn_limiter_cleanup(limiter: Arc<UserRateLimiter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            limiter.retain_recent();
            limiter.shrink_to_fit();
            debug!(tracked_users = limiter.len(), "Pruned rate limiter state");
        }
    })
}

pub async fn rate_limiter_middleware(
    State(state): State<AppState>,
    user: AuthUser,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check_key(&user.user_id).is_err() {
            warn!(user_id = %user.user_id, "Rate limit exceeded");
            return Err(AppError::RateLimited(
                "too many concept requests, try again later".to_string(),
            ));
        }
    }
    Ok(next.run(req).await)
}
