//! Embedding refresh pipeline.
//!
//! After a profile or job mutation commits, the handler submits a
//! `RefreshTask` to the `RefreshDispatcher` and returns immediately. A worker
//! runs each task under a semaphore so a burst of edits cannot fan out
//! unbounded calls to the embedding endpoint. Each run: embed the summary
//! (bounded by a timeout) → validate the vector → overwrite the stored one.
//!
//! A failed run leaves the previous embedding untouched. There is no retry
//! scheduler; the next mutation of the entity submits a fresh task.
//!
//! Runs for the same entity may overlap. Only the newest submission for a
//! target is allowed to write, so a slow older run can never put back a
//! vector for text the entity no longer has.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::embeddings::{EmbeddingRepository, StoreOutcome};
use super::MatchError;

/// Pending tasks beyond this are rejected (and recorded as failures).
const QUEUE_CAPACITY: usize = 1024;
/// Number of recent failures kept for inspection.
pub const FAILURE_LOG_CAPACITY: usize = 256;

/// Text in, raw embedding out. The response is returned unparsed; shape
/// validation is the pipeline's job.
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Value, MatchError>;
}

/// The entity whose embedding is being regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    User(String),
    Job(Uuid),
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTarget::User(uid) => write!(f, "user:{uid}"),
            RefreshTarget::Job(id) => write!(f, "job:{id}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshTask {
    pub target: RefreshTarget,
    pub summary: String,
}

impl RefreshTask {
    pub fn user(uid: impl Into<String>, summary: String) -> Self {
        Self {
            target: RefreshTarget::User(uid.into()),
            summary,
        }
    }

    pub fn job(job_id: Uuid, summary: String) -> Self {
        Self {
            target: RefreshTarget::Job(job_id),
            summary,
        }
    }
}

/// Converts a raw embedding response into a vector of `dimension` numbers.
///
/// Anything else (not an array, a non-numeric element, wrong length, or an
/// all-zero vector that can never be compared) is a `Validation` error.
pub fn validate_embedding(raw: &Value, dimension: usize) -> Result<Vec<f64>, MatchError> {
    let items = raw
        .as_array()
        .ok_or_else(|| MatchError::Validation(format!("expected an array, got {}", kind_of(raw))))?;

    if items.len() != dimension {
        return Err(MatchError::Validation(format!(
            "expected {dimension} dimensions, got {}",
            items.len()
        )));
    }

    let mut vector = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let value = item.as_f64().ok_or_else(|| {
            MatchError::Validation(format!("element {i} is {}, not a number", kind_of(item)))
        })?;
        vector.push(value);
    }

    if vector.iter().all(|v| *v == 0.0) {
        return Err(MatchError::Validation("all-zero embedding".to_string()));
    }
    Ok(vector)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub struct RefreshPipeline {
    source: Arc<dyn EmbeddingSource>,
    repository: Arc<dyn EmbeddingRepository>,
    dimension: usize,
    timeout: Duration,
}

impl RefreshPipeline {
    pub fn new(
        source: Arc<dyn EmbeddingSource>,
        repository: Arc<dyn EmbeddingRepository>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            repository,
            dimension,
            timeout,
        }
    }

    /// Embeds the task's summary and overwrites the target's stored vector.
    /// Nothing is written unless the vector passes validation.
    pub async fn run(&self, task: &RefreshTask) -> Result<StoreOutcome, MatchError> {
        let embedding = self.embed(task).await?;
        self.store(task, &embedding).await
    }

    async fn embed(&self, task: &RefreshTask) -> Result<Vec<f64>, MatchError> {
        info!("Refreshing embedding for {}", task.target);

        let raw = tokio::time::timeout(self.timeout, self.source.embed(&task.summary))
            .await
            .map_err(|_| {
                MatchError::Upstream(format!(
                    "embedding request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        validate_embedding(&raw, self.dimension)
    }

    async fn store(
        &self,
        task: &RefreshTask,
        embedding: &[f64],
    ) -> Result<StoreOutcome, MatchError> {
        let outcome = match &task.target {
            RefreshTarget::User(uid) => {
                self.repository.store_user_embedding(uid, embedding).await?;
                StoreOutcome::Stored
            }
            RefreshTarget::Job(job_id) => {
                self.repository
                    .store_job_embedding(*job_id, &task.summary, embedding)
                    .await?
            }
        };

        if outcome == StoreOutcome::Stored {
            info!("Embedding refreshed for {}", task.target);
        }
        Ok(outcome)
    }
}

/// A refresh run that did not land.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshFailure {
    pub target: String,
    pub kind: String,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

/// Bounded log of recent refresh failures, oldest evicted first.
pub struct FailureLog {
    entries: Mutex<VecDeque<RefreshFailure>>,
    capacity: usize,
}

impl FailureLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, target: &RefreshTarget, kind: &str, message: String) {
        let failure = RefreshFailure {
            target: target.to_string(),
            kind: kind.to_string(),
            message,
            failed_at: Utc::now(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(failure);
    }

    /// Most recent failure first.
    pub fn recent(&self) -> Vec<RefreshFailure> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().cloned().collect()
    }
}

struct QueuedTask {
    task: RefreshTask,
    generation: u64,
}

#[derive(Default)]
struct GenerationState {
    next: u64,
    latest: HashMap<RefreshTarget, u64>,
}

/// Newest queued generation per target.
///
/// Entries are removed when the newest run for a target finishes, so a
/// target with no entry has nothing current: any run still holding an older
/// generation for it is stale.
#[derive(Default)]
struct Generations {
    state: Mutex<GenerationState>,
    /// Held across the final currency check and the write, so a run that
    /// passed the check cannot land after a newer run's write.
    writes: tokio::sync::Mutex<()>,
}

impl Generations {
    fn lock(&self) -> std::sync::MutexGuard<'_, GenerationState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Assigns the next generation to `task` and queues it. Numbering and
    /// queueing happen under one lock so generations follow queue order.
    fn enqueue(&self, slot: mpsc::Permit<'_, QueuedTask>, task: RefreshTask) {
        let mut state = self.lock();
        state.next += 1;
        let generation = state.next;
        state.latest.insert(task.target.clone(), generation);
        slot.send(QueuedTask { task, generation });
    }

    fn is_current(&self, target: &RefreshTarget, generation: u64) -> bool {
        self.lock().latest.get(target) == Some(&generation)
    }

    fn retire(&self, target: &RefreshTarget, generation: u64) {
        let mut state = self.lock();
        if state.latest.get(target) == Some(&generation) {
            state.latest.remove(target);
        }
    }
}

/// Non-blocking front door to the refresh pipeline.
#[derive(Clone)]
pub struct RefreshDispatcher {
    sender: mpsc::Sender<QueuedTask>,
    failures: Arc<FailureLog>,
    generations: Arc<Generations>,
}

impl RefreshDispatcher {
    /// Starts the worker. The returned handle resolves once every dispatcher
    /// clone is dropped and all in-flight runs have finished.
    pub fn spawn(pipeline: Arc<RefreshPipeline>, concurrency: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let failures = Arc::new(FailureLog::new(FAILURE_LOG_CAPACITY));
        let generations = Arc::new(Generations::default());
        let concurrency = concurrency.max(1);

        let worker = tokio::spawn(run_worker(
            receiver,
            pipeline,
            Arc::new(Semaphore::new(concurrency)),
            concurrency,
            failures.clone(),
            generations.clone(),
        ));

        (
            Self {
                sender,
                failures,
                generations,
            },
            worker,
        )
    }

    /// Queues a refresh without waiting for it. Any earlier refresh for the
    /// same target that has not yet written is superseded.
    pub fn submit(&self, task: RefreshTask) {
        let target = task.target.clone();
        match self.sender.try_reserve() {
            Ok(slot) => {
                self.generations.enqueue(slot, task);
                info!("Embedding refresh queued for {target}");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Refresh queue full; dropping refresh for {target}");
                self.failures
                    .record(&target, "queue_full", "refresh queue is full".to_string());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Refresh worker stopped; dropping refresh for {target}");
                self.failures
                    .record(&target, "queue_closed", "refresh worker stopped".to_string());
            }
        }
    }

    pub fn failures(&self) -> Vec<RefreshFailure> {
        self.failures.recent()
    }

    /// Shared handle to the failure log that outlives the dispatcher.
    pub fn failure_log(&self) -> Arc<FailureLog> {
        self.failures.clone()
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<QueuedTask>,
    pipeline: Arc<RefreshPipeline>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    failures: Arc<FailureLog>,
    generations: Arc<Generations>,
) {
    while let Some(queued) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let pipeline = pipeline.clone();
        let failures = failures.clone();
        let generations = generations.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let target = &queued.task.target;
            match refresh_if_current(&pipeline, &generations, &queued).await {
                Ok(StoreOutcome::Stored) => {}
                Ok(StoreOutcome::Superseded) => {
                    info!("Embedding refresh for {target} superseded by a newer one; skipped")
                }
                Err(e) => {
                    error!("Embedding refresh failed for {target} ({}): {e}", e.kind());
                    failures.record(target, e.kind(), e.to_string());
                }
            }
            generations.retire(target, queued.generation);
        });
    }

    // Drain: every permit comes back once the last run finishes.
    let _ = semaphore.acquire_many(concurrency as u32).await;
    info!("Embedding refresh worker stopped");
}

async fn refresh_if_current(
    pipeline: &RefreshPipeline,
    generations: &Generations,
    queued: &QueuedTask,
) -> Result<StoreOutcome, MatchError> {
    let QueuedTask { task, generation } = queued;
    if !generations.is_current(&task.target, *generation) {
        return Ok(StoreOutcome::Superseded);
    }

    let embedding = pipeline.embed(task).await?;

    let _writes = generations.writes.lock().await;
    if !generations.is_current(&task.target, *generation) {
        return Ok(StoreOutcome::Superseded);
    }
    pipeline.store(task, &embedding).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::testing::{InMemoryEmbeddings, ScriptedSource, TextDependentSource};
    use serde_json::json;

    const DIM: usize = 4;

    fn pipeline(
        source: Arc<ScriptedSource>,
        repository: Arc<InMemoryEmbeddings>,
        timeout: Duration,
    ) -> RefreshPipeline {
        RefreshPipeline::new(source, repository, DIM, timeout)
    }

    #[test]
    fn test_validate_accepts_numbers_of_expected_dimension() {
        let vector = validate_embedding(&json!([0.1, 0.2, 0, 1]), DIM).unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.0, 1.0]);
    }

    #[test]
    fn test_validate_rejects_non_numeric_element() {
        let err = validate_embedding(&json!([0.1, "0.2", 0.3, 0.4]), DIM).unwrap_err();
        assert!(matches!(err, MatchError::Validation(ref m) if m.contains("element 1")));
    }

    #[test]
    fn test_validate_rejects_wrong_dimension() {
        let err = validate_embedding(&json!([0.1, 0.2]), DIM).unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_non_array() {
        assert!(validate_embedding(&json!({"embedding": []}), DIM).is_err());
        assert!(validate_embedding(&Value::Null, DIM).is_err());
    }

    #[test]
    fn test_validate_rejects_all_zero_vector() {
        assert!(validate_embedding(&json!([0.0, 0.0, 0.0, 0.0]), DIM).is_err());
    }

    #[tokio::test]
    async fn test_run_overwrites_user_embedding() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        repository.set_user("u1", vec![9.0; DIM]);
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!([0.1, 0.2, 0.3, 0.4]))]));

        pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::user("u1", "Location: Pune".to_string()))
            .await
            .unwrap();

        assert_eq!(repository.user("u1"), Some(vec![0.1, 0.2, 0.3, 0.4]));
    }

    #[tokio::test]
    async fn test_run_stores_job_embedding_for_committed_summary() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let job_id = Uuid::new_v4();
        repository.add_job_without_embedding(job_id);
        repository.set_job_summary(job_id, "Job Title: SRE");
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!([1, 0, 0, 0]))]));

        let outcome = pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::job(job_id, "Job Title: SRE".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Stored);
        assert_eq!(repository.job(job_id), Some(vec![1.0, 0.0, 0.0, 0.0]));
        assert_eq!(repository.job_summary(job_id).as_deref(), Some("Job Title: SRE"));
    }

    #[tokio::test]
    async fn test_run_discards_embedding_for_replaced_job_summary() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let job_id = Uuid::new_v4();
        repository.set_job(job_id, vec![0.0, 1.0, 0.0, 0.0]);
        repository.set_job_summary(job_id, "Job Title: Staff SRE");
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!([1, 0, 0, 0]))]));

        let outcome = pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::job(job_id, "Job Title: SRE".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Superseded);
        assert_eq!(repository.job(job_id), Some(vec![0.0, 1.0, 0.0, 0.0]));
        assert_eq!(
            repository.job_summary(job_id).as_deref(),
            Some("Job Title: Staff SRE")
        );
    }

    #[tokio::test]
    async fn test_malformed_embedding_leaves_prior_vector() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        repository.set_user("u1", vec![0.5; DIM]);
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!([0.1, null, 0.3, 0.4]))]));

        let err = pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::user("u1", "summary".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::Validation(_)));
        assert_eq!(repository.user("u1"), Some(vec![0.5; DIM]));
    }

    #[tokio::test]
    async fn test_malformed_embedding_does_not_create_one() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!(["a", "b", "c", "d"]))]));

        let result = pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::user("u1", "summary".to_string()))
            .await;

        assert!(result.is_err());
        assert_eq!(repository.user("u1"), None);
    }

    #[tokio::test]
    async fn test_upstream_failure_leaves_prior_vector() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        repository.set_user("u1", vec![0.5; DIM]);
        let source = Arc::new(ScriptedSource::new(vec![Err(MatchError::Upstream(
            "503".into(),
        ))]));

        let err = pipeline(source, repository.clone(), Duration::from_secs(5))
            .run(&RefreshTask::user("u1", "summary".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::Upstream(_)));
        assert_eq!(repository.user("u1"), Some(vec![0.5; DIM]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out_as_upstream_failure() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(json!([0.1, 0.2, 0.3, 0.4]))])
                .with_delay(Duration::from_secs(60)),
        );

        let err = pipeline(source, repository.clone(), Duration::from_secs(1))
            .run(&RefreshTask::user("u1", "summary".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::Upstream(ref m) if m.contains("timed out")));
        assert_eq!(repository.user("u1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_bounds_concurrency() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let responses = (0..6).map(|_| Ok(json!([0.1, 0.2, 0.3, 0.4]))).collect();
        let source =
            Arc::new(ScriptedSource::new(responses).with_delay(Duration::from_millis(200)));
        let pipeline = Arc::new(pipeline(
            source.clone(),
            repository.clone(),
            Duration::from_secs(5),
        ));

        let (dispatcher, worker) = RefreshDispatcher::spawn(pipeline, 2);
        for i in 0..6 {
            dispatcher.submit(RefreshTask::user(format!("u{i}"), "summary".to_string()));
        }
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(source.calls(), 6);
        assert!(source.peak_in_flight() <= 2, "peak was {}", source.peak_in_flight());
        for i in 0..6 {
            assert!(repository.user(&format!("u{i}")).is_some());
        }
    }

    fn old_slow_new_fast() -> Arc<TextDependentSource> {
        Arc::new(TextDependentSource {
            slow_marker: "old",
            slow: Duration::from_millis(500),
            slow_vector: json!([1.0, 0.0, 0.0, 0.0]),
            fast: Duration::from_millis(10),
            fast_vector: json!([0.0, 1.0, 0.0, 0.0]),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_job_refresh_finishing_last_does_not_overwrite_newer() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let job_id = Uuid::new_v4();
        repository.add_job_without_embedding(job_id);
        let pipeline = Arc::new(RefreshPipeline::new(
            old_slow_new_fast(),
            repository.clone(),
            DIM,
            Duration::from_secs(5),
        ));

        let (dispatcher, worker) = RefreshDispatcher::spawn(pipeline, 3);
        let log = dispatcher.failure_log();
        repository.set_job_summary(job_id, "Job Title: old");
        dispatcher.submit(RefreshTask::job(job_id, "Job Title: old".to_string()));
        tokio::time::sleep(Duration::from_millis(1)).await;
        repository.set_job_summary(job_id, "Job Title: new");
        dispatcher.submit(RefreshTask::job(job_id, "Job Title: new".to_string()));
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(repository.job_summary(job_id).as_deref(), Some("Job Title: new"));
        assert_eq!(repository.job(job_id), Some(vec![0.0, 1.0, 0.0, 0.0]));
        assert!(log.recent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_user_refresh_finishing_last_does_not_overwrite_newer() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let pipeline = Arc::new(RefreshPipeline::new(
            old_slow_new_fast(),
            repository.clone(),
            DIM,
            Duration::from_secs(5),
        ));

        let (dispatcher, worker) = RefreshDispatcher::spawn(pipeline, 3);
        let log = dispatcher.failure_log();
        dispatcher.submit(RefreshTask::user("u1", "Location: old".to_string()));
        tokio::time::sleep(Duration::from_millis(1)).await;
        dispatcher.submit(RefreshTask::user("u1", "Location: new".to_string()));
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(repository.user("u1"), Some(vec![0.0, 1.0, 0.0, 0.0]));
        assert!(log.recent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_refresh_superseded_before_it_starts_is_skipped() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let responses = (0..3).map(|_| Ok(json!([0.1, 0.2, 0.3, 0.4]))).collect();
        let source =
            Arc::new(ScriptedSource::new(responses).with_delay(Duration::from_millis(100)));
        let pipeline = Arc::new(pipeline(
            source.clone(),
            repository.clone(),
            Duration::from_secs(5),
        ));

        // One slot: u1's first two submissions wait behind u0 and only the last runs.
        let (dispatcher, worker) = RefreshDispatcher::spawn(pipeline, 1);
        dispatcher.submit(RefreshTask::user("u0", "summary".to_string()));
        for _ in 0..3 {
            dispatcher.submit(RefreshTask::user("u1", "summary".to_string()));
        }
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(source.calls(), 2);
        assert!(repository.user("u0").is_some());
        assert!(repository.user("u1").is_some());
    }

    #[tokio::test]
    async fn test_dispatcher_records_failures() {
        let repository = Arc::new(InMemoryEmbeddings::default());
        let source = Arc::new(ScriptedSource::new(vec![Ok(json!([1.0]))]));
        let pipeline = Arc::new(pipeline(source, repository, Duration::from_secs(5)));

        let (dispatcher, worker) = RefreshDispatcher::spawn(pipeline, 3);
        let log = dispatcher.failure_log();
        dispatcher.submit(RefreshTask::user("u1", "summary".to_string()));
        drop(dispatcher);
        worker.await.unwrap();

        let failures = log.recent();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, "user:u1");
        assert_eq!(failures[0].kind, "validation");
    }

    #[test]
    fn test_failure_log_evicts_oldest() {
        let log = FailureLog::new(2);
        for i in 0..3 {
            log.record(&RefreshTarget::User(format!("u{i}")), "upstream", "down".into());
        }
        let recent = log.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].target, "user:u2");
        assert_eq!(recent[1].target, "user:u1");
    }
}
