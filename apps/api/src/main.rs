mod auth;
mod config;
mod db;
mod documents;
mod errors;
mod extract;
mod jobs;
mod llm_client;
mod matching;
mod models;
mod profile;
mod resume;
mod routes;
mod state;
mod storage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::JwtIdentityProvider;
use crate::config::Config;
use crate::db::create_pool;
use crate::documents::DocumentStore;
use crate::llm_client::LlmClient;
use crate::matching::embeddings::PgEmbeddingRepository;
use crate::matching::recommender::Recommender;
use crate::matching::refresh::{RefreshDispatcher, RefreshPipeline};
use crate::matching::score_store::PgScoreStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HireMatch API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis-backed document store
    let documents = DocumentStore::new(redis::Client::open(config.redis_url.clone())?);
    info!("Document store initialized");

    // Initialize S3 / LocalStack
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::new(&config)?;
    info!(
        "LLM client initialized (chat: {}, embeddings: {})",
        llm.chat_deployment(),
        config.llm_embedding_deployment
    );

    // Matching core
    let embeddings = Arc::new(PgEmbeddingRepository::new(db.clone(), documents.clone()));
    let recommender = Arc::new(
        Recommender::new(embeddings.clone(), Arc::new(PgScoreStore::new(db.clone())))
            .with_limit(config.recommendation_limit),
    );
    let pipeline = Arc::new(RefreshPipeline::new(
        Arc::new(llm.clone()),
        embeddings,
        config.embedding_dimension,
        Duration::from_secs(config.embedding_timeout_secs),
    ));
    let (refresh, _refresh_worker) = RefreshDispatcher::spawn(pipeline, config.refresh_concurrency);
    info!(
        "Embedding refresh worker started (concurrency: {}, dimension: {})",
        config.refresh_concurrency, config.embedding_dimension
    );

    // Build app state
    let state = AppState {
        db,
        documents,
        s3,
        llm,
        identity: Arc::new(
            JwtIdentityProvider::new(&config.jwt_secret)
                .with_revoked(config.jwt_revoked_ids.clone()),
        ),
        recommender,
        refresh,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict CORS origins to the frontend host
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for LocalStack (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "hirematch-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    // LocalStack serves buckets by path, not by virtual host.
    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
