//! In-memory collaborators for exercising the matching core without a
//! database, document store, or embedding endpoint.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::embeddings::{EmbeddingRepository, StoreOutcome};
use super::refresh::EmbeddingSource;
use super::score_store::ScoreStore;
use super::similarity::{cosine_similarity, SimilarityMetric};
use super::MatchError;

#[derive(Default)]
pub struct InMemoryScoreStore {
    scores: Mutex<HashMap<(String, Uuid), f64>>,
    upserts: AtomicUsize,
}

impl InMemoryScoreStore {
    pub fn record_count(&self) -> usize {
        self.scores.lock().unwrap().len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn get_all_scores(&self, uid: &str) -> Result<HashMap<Uuid, f64>, MatchError> {
        Ok(self
            .scores
            .lock()
            .unwrap()
            .iter()
            .filter(|((u, _), _)| u == uid)
            .map(|((_, job), score)| (*job, *score))
            .collect())
    }

    async fn upsert_score(&self, uid: &str, job_id: Uuid, score: f64) -> Result<(), MatchError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.scores
            .lock()
            .unwrap()
            .insert((uid.to_string(), job_id), score);
        Ok(())
    }

    async fn scores_for_job(
        &self,
        job_id: Uuid,
        uids: &[String],
    ) -> Result<Vec<(String, f64)>, MatchError> {
        let mut rows: Vec<(String, f64)> = self
            .scores
            .lock()
            .unwrap()
            .iter()
            .filter(|((u, j), _)| *j == job_id && uids.contains(u))
            .map(|((u, _), score)| (u.clone(), *score))
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(rows)
    }
}

/// Score store whose reads or writes always fail with a transient error.
pub struct FailingScoreStore {
    fail_reads: bool,
    writes: AtomicUsize,
}

impl FailingScoreStore {
    pub fn failing_writes() -> Self {
        Self {
            fail_reads: false,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreStore for FailingScoreStore {
    async fn get_all_scores(&self, _uid: &str) -> Result<HashMap<Uuid, f64>, MatchError> {
        if self.fail_reads {
            return Err(MatchError::TransientStore("connection reset".into()));
        }
        Ok(HashMap::new())
    }

    async fn upsert_score(&self, _uid: &str, _job: Uuid, _score: f64) -> Result<(), MatchError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(MatchError::TransientStore("write timed out".into()))
    }

    async fn scores_for_job(
        &self,
        _job_id: Uuid,
        _uids: &[String],
    ) -> Result<Vec<(String, f64)>, MatchError> {
        Err(MatchError::TransientStore("connection reset".into()))
    }
}

#[derive(Default)]
pub struct InMemoryEmbeddings {
    users: Mutex<HashMap<String, Vec<f64>>>,
    jobs: Mutex<BTreeMap<Uuid, Option<Vec<f64>>>>,
    summaries: Mutex<HashMap<Uuid, String>>,
}

impl InMemoryEmbeddings {
    pub fn set_user(&self, uid: &str, embedding: Vec<f64>) {
        self.users.lock().unwrap().insert(uid.to_string(), embedding);
    }

    pub fn set_job(&self, job_id: Uuid, embedding: Vec<f64>) {
        self.jobs.lock().unwrap().insert(job_id, Some(embedding));
    }

    pub fn add_job_without_embedding(&self, job_id: Uuid) {
        self.jobs.lock().unwrap().insert(job_id, None);
    }

    pub fn user(&self, uid: &str) -> Option<Vec<f64>> {
        self.users.lock().unwrap().get(uid).cloned()
    }

    pub fn job(&self, job_id: Uuid) -> Option<Vec<f64>> {
        self.jobs.lock().unwrap().get(&job_id).cloned().flatten()
    }

    /// Commits `summary` as the job's current text, the way the job handlers do.
    pub fn set_job_summary(&self, job_id: Uuid, summary: &str) {
        self.summaries
            .lock()
            .unwrap()
            .insert(job_id, summary.to_string());
    }

    pub fn job_summary(&self, job_id: Uuid) -> Option<String> {
        self.summaries.lock().unwrap().get(&job_id).cloned()
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryEmbeddings {
    async fn user_embedding(&self, uid: &str) -> Result<Option<Vec<f64>>, MatchError> {
        Ok(self.user(uid))
    }

    async fn job_embeddings(&self) -> Result<Vec<(Uuid, Vec<f64>)>, MatchError> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(id, emb)| emb.clone().map(|e| (*id, e)))
            .collect())
    }

    async fn store_user_embedding(&self, uid: &str, embedding: &[f64]) -> Result<(), MatchError> {
        self.set_user(uid, embedding.to_vec());
        Ok(())
    }

    async fn store_job_embedding(
        &self,
        job_id: Uuid,
        summary: &str,
        embedding: &[f64],
    ) -> Result<StoreOutcome, MatchError> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job_id) {
            return Err(MatchError::NotFound(format!("Job {job_id} not found")));
        }
        if self.job_summary(job_id).as_deref() != Some(summary) {
            return Ok(StoreOutcome::Superseded);
        }
        jobs.insert(job_id, Some(embedding.to_vec()));
        Ok(StoreOutcome::Stored)
    }
}

/// Cosine similarity that counts how often it is invoked.
#[derive(Default)]
pub struct CountingMetric {
    calls: AtomicUsize,
}

impl CountingMetric {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SimilarityMetric for CountingMetric {
    fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cosine_similarity(a, b)
    }
}

/// Embedding source that replays queued responses, optionally after a delay.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Value, MatchError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<Value, MatchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingSource for ScriptedSource {
    async fn embed(&self, _text: &str) -> Result<Value, MatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MatchError::Upstream("no scripted response".into())))
    }
}

/// Embedding source whose latency and vector depend on the text: summaries
/// containing `slow_marker` answer late with `slow_vector`, the rest answer
/// quickly with `fast_vector`.
pub struct TextDependentSource {
    pub slow_marker: &'static str,
    pub slow: Duration,
    pub slow_vector: Value,
    pub fast: Duration,
    pub fast_vector: Value,
}

#[async_trait]
impl EmbeddingSource for TextDependentSource {
    async fn embed(&self, text: &str) -> Result<Value, MatchError> {
        if text.contains(self.slow_marker) {
            tokio::time::sleep(self.slow).await;
            Ok(self.slow_vector.clone())
        } else {
            tokio::time::sleep(self.fast).await;
            Ok(self.fast_vector.clone())
        }
    }
}
