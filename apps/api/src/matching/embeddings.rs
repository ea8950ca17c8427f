//! Access to the embedding vectors owned by users and job listings.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::MatchError;
use crate::documents::DocumentStore;

/// Whether a job embedding write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// The job's summary changed after this vector was requested, so the
    /// vector describes text that no longer exists and was discarded.
    Superseded,
}

/// Read/write access to user and job embeddings.
///
/// One vector per entity, overwritten on every refresh; no history is kept.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// The user's current embedding, or `None` if the user has none yet.
    async fn user_embedding(&self, uid: &str) -> Result<Option<Vec<f64>>, MatchError>;

    /// Id and embedding of every job that has one. Jobs without an embedding
    /// are not returned.
    async fn job_embeddings(&self) -> Result<Vec<(Uuid, Vec<f64>)>, MatchError>;

    async fn store_user_embedding(&self, uid: &str, embedding: &[f64]) -> Result<(), MatchError>;

    /// Stores `embedding` only while the job's committed summary still equals
    /// `summary`. The summary itself is written by the job handlers.
    async fn store_job_embedding(
        &self,
        job_id: Uuid,
        summary: &str,
        embedding: &[f64],
    ) -> Result<StoreOutcome, MatchError>;
}

/// Embeddings live in PostgreSQL (`DOUBLE PRECISION[]` columns); job
/// summaries and their vectors are mirrored into the document store.
#[derive(Clone)]
pub struct PgEmbeddingRepository {
    pool: PgPool,
    documents: DocumentStore,
}

impl PgEmbeddingRepository {
    pub fn new(pool: PgPool, documents: DocumentStore) -> Self {
        Self { pool, documents }
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn user_embedding(&self, uid: &str) -> Result<Option<Vec<f64>>, MatchError> {
        let embedding: Option<Option<Vec<f64>>> =
            sqlx::query_scalar("SELECT embedding FROM users WHERE uid = $1")
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(embedding.flatten())
    }

    async fn job_embeddings(&self) -> Result<Vec<(Uuid, Vec<f64>)>, MatchError> {
        Ok(sqlx::query_as::<_, (Uuid, Vec<f64>)>(
            "SELECT id, embedding FROM job_listings WHERE embedding IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn store_user_embedding(&self, uid: &str, embedding: &[f64]) -> Result<(), MatchError> {
        let result = sqlx::query("UPDATE users SET embedding = $1 WHERE uid = $2")
            .bind(embedding)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MatchError::NotFound(format!("User {uid} not found")));
        }
        info!("Embedding stored for user {uid}");
        Ok(())
    }

    async fn store_job_embedding(
        &self,
        job_id: Uuid,
        summary: &str,
        embedding: &[f64],
    ) -> Result<StoreOutcome, MatchError> {
        let result = sqlx::query(
            "UPDATE job_listings SET embedding = $1 WHERE id = $2 AND job_summary = $3",
        )
        .bind(embedding)
        .bind(job_id)
        .bind(summary)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM job_listings WHERE id = $1)")
                    .bind(job_id)
                    .fetch_one(&self.pool)
                    .await?;
            if !exists {
                return Err(MatchError::NotFound(format!("Job {job_id} not found")));
            }
            info!("Embedding for job {job_id} superseded by a newer summary; discarded");
            return Ok(StoreOutcome::Superseded);
        }
        info!("Embedding stored for job {job_id}");

        mirror_job_summary(&self.documents, job_id, summary, embedding).await;
        Ok(StoreOutcome::Stored)
    }
}

/// Copies a stored job summary and its vector into the document store.
/// PostgreSQL is the source of truth, so a failed copy is logged and the
/// refresh still counts as landed.
async fn mirror_job_summary(
    documents: &DocumentStore,
    job_id: Uuid,
    summary: &str,
    embedding: &[f64],
) -> bool {
    match documents.save_job_summary(job_id, summary, embedding).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Job summary mirror write failed for job {job_id}: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mirror_failure_is_not_fatal() {
        let documents = DocumentStore::new(redis::Client::open("redis://127.0.0.1:1/").unwrap());
        let mirrored =
            mirror_job_summary(&documents, Uuid::new_v4(), "Job Title: SRE", &[1.0, 0.0]).await;
        assert!(!mirrored);
    }
}
