//! Score store: persistent (user, job) -> similarity score mapping.
//!
//! The `match_scores` table carries `UNIQUE (uid, job_id)`; every write is an
//! upsert against that constraint, so concurrent writers to the same pair
//! resolve last-write-wins and writers to different pairs never contend.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::MatchError;

#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Every cached score for `uid`, keyed by job. Empty when none exist.
    async fn get_all_scores(&self, uid: &str) -> Result<HashMap<Uuid, f64>, MatchError>;

    /// Inserts or replaces the score for the pair. Idempotent.
    async fn upsert_score(&self, uid: &str, job_id: Uuid, score: f64) -> Result<(), MatchError>;

    /// Cached scores of `uids` against one job, highest first.
    async fn scores_for_job(
        &self,
        job_id: Uuid,
        uids: &[String],
    ) -> Result<Vec<(String, f64)>, MatchError>;
}

/// PostgreSQL-backed score store.
#[derive(Clone)]
pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn get_all_scores(&self, uid: &str) -> Result<HashMap<Uuid, f64>, MatchError> {
        let rows: Vec<(Uuid, f64)> =
            sqlx::query_as("SELECT job_id, score FROM match_scores WHERE uid = $1")
                .bind(uid)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    async fn upsert_score(&self, uid: &str, job_id: Uuid, score: f64) -> Result<(), MatchError> {
        sqlx::query(
            r#"
            INSERT INTO match_scores (id, uid, job_id, score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (uid, job_id) DO UPDATE SET
                score = EXCLUDED.score,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(uid)
        .bind(job_id)
        .bind(score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scores_for_job(
        &self,
        job_id: Uuid,
        uids: &[String],
    ) -> Result<Vec<(String, f64)>, MatchError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT uid, score
            FROM match_scores
            WHERE job_id = $1 AND uid = ANY($2)
            ORDER BY score DESC, uid ASC
            "#,
        )
        .bind(job_id)
        .bind(uids)
        .fetch_all(&self.pool)
        .await?)
    }
}
