//! Match scoring and recommendation engine.
//!
//! Embeddings are produced by the refresh pipeline (`refresh`), scores are
//! cached per (user, job) pair in the score store (`score_store`), and the
//! recommender ranks jobs for a user by cosine similarity (`similarity`).

pub mod embeddings;
pub mod handlers;
pub mod recommender;
pub mod refresh;
pub mod score_store;
pub mod similarity;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;

/// Failure taxonomy of the matching core.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed embedding vector. Never persisted.
    #[error("Invalid embedding: {0}")]
    Validation(String),

    /// Degenerate similarity input, e.g. a zero-magnitude vector.
    #[error("Similarity computation failed: {0}")]
    Computation(String),

    /// Store unavailable or timed out. Safe to retry: all writes are upserts.
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    /// Embedding source unreachable, timed out, or returned non-success.
    #[error("Embedding source failed: {0}")]
    Upstream(String),
}

impl MatchError {
    /// Short label used in logs and the refresh failure log.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::NotFound(_) => "not_found",
            MatchError::Validation(_) => "validation",
            MatchError::Computation(_) => "computation",
            MatchError::TransientStore(_) => "transient_store",
            MatchError::Upstream(_) => "upstream",
        }
    }
}

impl From<sqlx::Error> for MatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => MatchError::NotFound("row not found".to_string()),
            other => MatchError::TransientStore(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for MatchError {
    fn from(err: redis::RedisError) -> Self {
        MatchError::TransientStore(format!("document store: {err}"))
    }
}
