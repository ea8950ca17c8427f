use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_chat_deployment: String,
    pub llm_embedding_deployment: String,
    pub llm_api_version: String,
    pub jwt_secret: String,
    /// Token ids (`jti`) refused even when otherwise valid.
    pub jwt_revoked_ids: Vec<String>,
    /// Dimensionality every stored embedding must have.
    pub embedding_dimension: usize,
    pub embedding_timeout_secs: u64,
    /// Maximum number of embedding refreshes in flight at once.
    pub refresh_concurrency: usize,
    pub recommendation_limit: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_base_url: require_env("LLM_BASE_URL")?,
            llm_chat_deployment: env_or("LLM_CHAT_DEPLOYMENT", "gpt-4"),
            llm_embedding_deployment: env_or("LLM_EMBEDDING_DEPLOYMENT", "text-embedding-ada-002"),
            llm_api_version: env_or("LLM_API_VERSION", "2023-12-01-preview"),
            jwt_secret: require_env("JWT_SECRET")?,
            jwt_revoked_ids: split_list(&env_or("JWT_REVOKED_IDS", "")),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", 1536)?,
            embedding_timeout_secs: parse_env("EMBEDDING_TIMEOUT_SECS", 30)?,
            refresh_concurrency: parse_env("REFRESH_CONCURRENCY", 3)?,
            recommendation_limit: parse_env("RECOMMENDATION_LIMIT", 10)?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'"))
}

#[cfg(test)]
impl Config {
    /// Local-only settings for tests that need a full `AppState`.
    pub(crate) fn for_tests() -> Self {
        Config {
            database_url: "postgres://localhost/hirematch_test".to_string(),
            redis_url: "redis://127.0.0.1/".to_string(),
            s3_bucket: "resumes".to_string(),
            s3_endpoint: "http://localhost:4566".to_string(),
            aws_access_key_id: "test".to_string(),
            aws_secret_access_key: "test".to_string(),
            llm_api_key: "test".to_string(),
            llm_base_url: "http://localhost:9".to_string(),
            llm_chat_deployment: "gpt-4".to_string(),
            llm_embedding_deployment: "text-embedding-ada-002".to_string(),
            llm_api_version: "2023-12-01-preview".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_revoked_ids: vec![],
            embedding_dimension: 3,
            embedding_timeout_secs: 1,
            refresh_concurrency: 2,
            recommendation_limit: 10,
            port: 0,
            rust_log: "info".to_string(),
        }
    }
}
