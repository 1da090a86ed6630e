// Middleware and extractors for authentication, CORS, rate limiting and JSON bodies

pub mod auth;
pub mod cors;
pub mod json;
pub mod rate_limiter;

pub use auth::{verify_jwt, AuthUser, Claims};
pub use cors::cors_layer;
pub use json::ValidJson;
pub use rate_limiter::{
    build_limiter, rate_limiter_middleware, spawn_limiter_cleanup, UserRateLimiter,
};
