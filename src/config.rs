use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jigsawstack: JigsawStackConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub queue_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JigsawStackConfig {
    pub api_key: String,
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub concept_bucket: String,
    pub palette_bucket: String,
    pub signed_url_expiry_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Generate/refine submissions allowed per user per minute. Zero disables limiting.
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub task_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

/// A duration in whole seconds that must not be zero.
fn positive_secs(key: &str, raw: &str) -> Result<u64> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of seconds", key))?;
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(secs)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: var_or("PORT", "8000")
                    .parse()
                    .context("PORT must be a valid port number")?,
                host: var_or("HOST", "0.0.0.0"),
                cors_allowed_origins: var_or("ALLOWED_ORIGINS", "http://localhost:5173")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: var_or("DB_MAX_CONNECTIONS", "10").parse()?,
                min_connections: var_or("DB_MIN_CONNECTIONS", "1").parse()?,
            },
            redis: RedisConfig {
                url: var_or("REDIS_URL", "redis://localhost:6379"),
                queue_name: var_or("QUEUE_NAME", "concept-tasks"),
            },
            jigsawstack: JigsawStackConfig {
                api_key: required("JIGSAWSTACK_API_KEY")?,
                api_url: var_or("JIGSAWSTACK_API_URL", "https://api.jigsawstack.com"),
                timeout_secs: var_or("JIGSAWSTACK_TIMEOUT_SECS", "120").parse()?,
                max_retries: var_or("EXTERNAL_MAX_RETRIES", "3").parse()?,
            },
            storage: StorageConfig {
                endpoint: required("STORAGE_ENDPOINT")?,
                region: var_or("STORAGE_REGION", "us-east-1"),
                access_key_id: env::var("STORAGE_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("STORAGE_SECRET_ACCESS_KEY").ok(),
                concept_bucket: var_or("CONCEPT_BUCKET", "concept-images"),
                palette_bucket: var_or("PALETTE_BUCKET", "palette-images"),
                signed_url_expiry_secs: var_or("SIGNED_URL_EXPIRY_SECS", "3600").parse()?,
            },
            auth: AuthConfig {
                jwt_secret: required("SUPABASE_JWT_SECRET")?,
                audience: var_or("JWT_AUDIENCE", "authenticated"),
            },
            rate_limit: RateLimitConfig {
                requests_per_minute: var_or("RATE_LIMIT_PER_MINUTE", "10").parse()?,
            },
            worker: WorkerConfig {
                concurrency: var_or("WORKER_CONCURRENCY", "2").parse()?,
                task_timeout_secs: positive_secs(
                    "TASK_TIMEOUT_SECS",
                    &var_or("TASK_TIMEOUT_SECS", "900"),
                )?,
                sweep_interval_secs: positive_secs(
                    "TASK_SWEEP_INTERVAL_SECS",
                    &var_or("TASK_SWEEP_INTERVAL_SECS", "60"),
                )?,
            },
        })
    }
}
