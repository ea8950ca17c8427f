//! Document store for semi-structured blobs: parsed resumes and job summaries.
//!
//! Each document is a JSON string under a namespaced Redis key. Writes are
//! upserts (plain SET); reads return `None` for a missing key.

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

use crate::matching::MatchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDocument {
    pub uid: String,
    pub parsed_resume: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummaryDocument {
    pub job_id: Uuid,
    pub summary_text: String,
    pub embedding_vector: Vec<f64>,
}

fn candidate_key(uid: &str) -> String {
    format!("candidates:{uid}")
}

fn job_summary_key(job_id: Uuid) -> String {
    format!("job_summaries:{job_id}")
}

/// Clones share one multiplexed connection, opened on first use. A failed
/// connect is not cached; the next call tries again.
#[derive(Clone)]
pub struct DocumentStore {
    client: redis::Client,
    connection: Arc<OnceCell<MultiplexedConnection>>,
}

impl DocumentStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            connection: Arc::new(OnceCell::new()),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, MatchError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let conn = self.client.get_multiplexed_async_connection().await?;
                info!("Document store connection established");
                Ok::<_, redis::RedisError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn put<T: Serialize>(&self, key: &str, document: &T) -> Result<(), MatchError> {
        let body = serde_json::to_string(document)
            .map_err(|e| MatchError::Validation(format!("unserializable document: {e}")))?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, body).await?;
        Ok(())
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MatchError> {
        let mut conn = self.connection().await?;
        let body: Option<String> = conn.get(key).await?;
        body.map(|b| {
            serde_json::from_str(&b)
                .map_err(|e| MatchError::Validation(format!("corrupt document at {key}: {e}")))
        })
        .transpose()
    }

    pub async fn save_parsed_resume(&self, uid: &str, parsed_resume: Value) -> Result<(), MatchError> {
        let document = CandidateDocument {
            uid: uid.to_string(),
            parsed_resume,
        };
        self.put(&candidate_key(uid), &document).await?;
        info!("Parsed resume stored for user {uid}");
        Ok(())
    }

    /// The parsed resume for `uid`, if one has been stored and is a JSON object.
    pub async fn parsed_resume(&self, uid: &str) -> Result<Option<Value>, MatchError> {
        let document: Option<CandidateDocument> = self.get(&candidate_key(uid)).await?;
        Ok(document
            .map(|d| d.parsed_resume)
            .filter(|v| v.is_object()))
    }

    pub async fn save_job_summary(
        &self,
        job_id: Uuid,
        summary_text: &str,
        embedding: &[f64],
    ) -> Result<(), MatchError> {
        let document = JobSummaryDocument {
            job_id,
            summary_text: summary_text.trim().to_string(),
            embedding_vector: embedding.to_vec(),
        };
        self.put(&job_summary_key(job_id), &document).await?;
        info!("Job summary stored in document store for job {job_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(candidate_key("abc"), "candidates:abc");
        let id = Uuid::nil();
        assert_eq!(
            job_summary_key(id),
            "job_summaries:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_clones_share_one_connection_slot() {
        let store = DocumentStore::new(redis::Client::open("redis://127.0.0.1:1/").unwrap());
        let clone = store.clone();
        assert!(Arc::ptr_eq(&store.connection, &clone.connection));

        // Nothing listens there; the failure surfaces and is not cached.
        assert!(store.connection().await.is_err());
        assert!(!clone.connection.initialized());
    }

    #[test]
    fn test_candidate_document_shape() {
        let doc = CandidateDocument {
            uid: "u1".to_string(),
            parsed_resume: serde_json::json!({"Name": "Asha"}),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["uid"], "u1");
        assert_eq!(value["parsed_resume"]["Name"], "Asha");
    }
}
