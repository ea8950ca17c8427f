//! Recommendation engine — ranks jobs for a user by embedding similarity.
//!
//! Flow: user embedding → candidate job embeddings → cached scores →
//!       compute + persist missing scores → sort → top-K.
//!
//! Cached scores are reused verbatim even if either embedding changed after
//! they were computed. Only `recompute` overwrites them.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::embeddings::EmbeddingRepository;
use super::score_store::ScoreStore;
use super::similarity::{Cosine, SimilarityMetric};
use super::MatchError;

/// Number of recommendations returned when no limit is configured.
pub const DEFAULT_LIMIT: usize = 10;

/// One ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMatch {
    pub job_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachePolicy {
    /// Use any cached score; compute only missing pairs.
    Reuse,
    /// Ignore the cache and overwrite every pair.
    Recompute,
}

pub struct Recommender {
    embeddings: Arc<dyn EmbeddingRepository>,
    scores: Arc<dyn ScoreStore>,
    metric: Arc<dyn SimilarityMetric>,
    limit: usize,
}

impl Recommender {
    pub fn new(embeddings: Arc<dyn EmbeddingRepository>, scores: Arc<dyn ScoreStore>) -> Self {
        Self {
            embeddings,
            scores,
            metric: Arc::new(Cosine),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_metric(mut self, metric: Arc<dyn SimilarityMetric>) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn scores(&self) -> &Arc<dyn ScoreStore> {
        &self.scores
    }

    /// Top-K jobs for `uid`, highest score first, reusing cached scores.
    ///
    /// A user without an embedding gets an empty list. Failures reading the
    /// embeddings or the cache abort the call; a failed score write is logged
    /// and the in-memory score is still ranked.
    pub async fn recommend(&self, uid: &str) -> Result<Vec<JobMatch>, MatchError> {
        self.rank(uid, CachePolicy::Reuse).await
    }

    /// Like `recommend`, but recomputes and overwrites every cached score for
    /// the user. This is the only path that refreshes a stale score.
    pub async fn recompute(&self, uid: &str) -> Result<Vec<JobMatch>, MatchError> {
        self.rank(uid, CachePolicy::Recompute).await
    }

    async fn rank(&self, uid: &str, policy: CachePolicy) -> Result<Vec<JobMatch>, MatchError> {
        info!("Starting job recommendation for user {uid} ({policy:?})");

        let Some(user_embedding) = self.embeddings.user_embedding(uid).await? else {
            warn!("No embedding found for user {uid}; returning no recommendations");
            return Ok(Vec::new());
        };

        let jobs = self.embeddings.job_embeddings().await?;
        info!("Candidate jobs with embeddings: {}", jobs.len());

        let cached = match policy {
            CachePolicy::Reuse => self.scores.get_all_scores(uid).await?,
            CachePolicy::Recompute => Default::default(),
        };
        info!("Cached match scores for user {uid}: {}", cached.len());

        let mut matches = Vec::with_capacity(jobs.len());
        let mut computed = 0usize;
        for (job_id, job_embedding) in &jobs {
            if let Some(&score) = cached.get(job_id) {
                debug!("Reusing cached score for job {job_id}");
                matches.push(JobMatch {
                    job_id: *job_id,
                    score,
                });
                continue;
            }

            let score = self.metric.similarity(&user_embedding, job_embedding)?;
            computed += 1;
            if let Err(e) = self.scores.upsert_score(uid, *job_id, score).await {
                warn!("Failed to persist score for user {uid} job {job_id}: {e}");
            }
            debug!("Computed score {score:.4} for job {job_id}");
            matches.push(JobMatch {
                job_id: *job_id,
                score,
            });
        }

        let ranked = top_k(matches, self.limit);
        info!(
            "Recommendation for user {uid} complete: {} computed, {} returned",
            computed,
            ranked.len()
        );
        Ok(ranked)
    }
}

/// Sorts by score descending, ties broken by ascending job id, then truncates.
pub fn top_k(mut matches: Vec<JobMatch>, k: usize) -> Vec<JobMatch> {
    matches.sort_by(compare_matches);
    matches.truncate(k);
    matches
}

fn compare_matches(a: &JobMatch, b: &JobMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.job_id.cmp(&b.job_id))
}
