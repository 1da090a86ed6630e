//! Shared fixtures for router and pipeline tests: in-memory backends,
//! a complete test configuration and signed bearer tokens.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use uuid::Uuid;

use concept_visualizer::{
    config::{
        AuthConfig, Config, DatabaseConfig, JigsawStackConfig, RateLimitConfig, RedisConfig,
        ServerConfig, StorageConfig, WorkerConfig,
    },
    db::{MemoryConceptRepository, MemoryTaskRepository},
    middleware::Claims,
    queue::MemoryJobQueue,
    services::{ConceptService, TaskService},
    storage::{Buckets, MemoryObjectStore},
    AppState,
};

pub const JWT_SECRET: &str = "integration-secret";

pub fn test_config(requests_per_minute: u32) -> Config {
    Config {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
            queue_name: "concept-tasks".to_string(),
        },
        jigsawstack: JigsawStackConfig {
            api_key: "test-key".to_string(),
            api_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        },
        storage: StorageConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            concept_bucket: "concept-images".to_string(),
            palette_bucket: "palette-images".to_string(),
            signed_url_expiry_secs: 3600,
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            audience: "authenticated".to_string(),
        },
        rate_limit: RateLimitConfig {
            requests_per_minute,
        },
        worker: WorkerConfig {
            concurrency: 1,
            task_timeout_secs: 900,
            sweep_interval_secs: 60,
        },
    }
}

/// Everything a test needs to drive the API and inspect the backends behind it.
pub struct TestApp {
    pub config: Config,
    pub router: Router,
    pub tasks: TaskService,
    pub concept_repo: Arc<MemoryConceptRepository>,
    pub store: Arc<MemoryObjectStore>,
    pub queue: Arc<MemoryJobQueue>,
}

pub fn setup_app(requests_per_minute: u32) -> TestApp {
    let config = test_config(requests_per_minute);
    let tasks = TaskService::new(Arc::new(MemoryTaskRepository::new()));
    let concept_repo = Arc::new(MemoryConceptRepository::new());
    let store = Arc::new(MemoryObjectStore::new());
    let queue = Arc::new(MemoryJobQueue::new());

    let concepts = ConceptService::new(
        concept_repo.clone(),
        store.clone(),
        Buckets::from(&config.storage),
    );
    let state = AppState::new(config.clone(), tasks.clone(), concepts, queue.clone());

    TestApp {
        router: concept_visualizer::create_router(state),
        config,
        tasks,
        concept_repo,
        store,
        queue,
    }
}

pub fn bearer(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        aud: Some("authenticated".to_string()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

pub fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub fn fox_request(num_palettes: u32) -> Value {
    serde_json::json!({
        "logo_description": "A minimalist fox logo",
        "theme_description": "Blue and gray corporate",
        "num_palettes": num_palettes
    })
}
