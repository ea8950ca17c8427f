use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::documents::DocumentStore;
use crate::llm_client::LlmClient;
use crate::matching::recommender::Recommender;
use crate::matching::refresh::RefreshDispatcher;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Parsed resumes and job summary documents (Redis).
    pub documents: DocumentStore,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Verifies bearer tokens. Default: JwtIdentityProvider.
    pub identity: Arc<dyn IdentityProvider>,
    pub recommender: Arc<Recommender>,
    /// Submits embedding refreshes without blocking the request.
    pub refresh: RefreshDispatcher,
}
