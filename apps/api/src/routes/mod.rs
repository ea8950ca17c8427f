pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::jobs::handlers as jobs;
use crate::matching::handlers as matching;
use crate::profile::handlers as profile;
use crate::resume::handlers as resume;
use crate::state::AppState;

/// Resume uploads are larger than axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Users and candidates
        .route(
            "/api/v1/users/me",
            get(profile::handle_me)
                .post(profile::handle_register)
                .put(profile::handle_update_profile),
        )
        .route("/api/v1/candidates", get(profile::handle_search_candidates))
        // Resume ingestion
        .route(
            "/api/v1/upload/resume",
            post(resume::handle_upload_resume).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Job listings
        .route("/api/v1/jobs", post(jobs::handle_create_job))
        .route("/api/v1/jobs/recruiter", get(jobs::handle_recruiter_jobs))
        .route(
            "/api/v1/jobs/:id",
            get(jobs::handle_get_job).patch(jobs::handle_update_job),
        )
        .route("/api/v1/jobs/:id/apply", post(jobs::handle_apply))
        .route(
            "/api/v1/ranked-candidates",
            get(jobs::handle_ranked_candidates),
        )
        // Matching
        .route(
            "/api/v1/match-scores/recommendations",
            get(matching::handle_recommendations),
        )
        .route(
            "/api/v1/match-scores/recommendations/recompute",
            post(matching::handle_recompute),
        )
        .route(
            "/api/v1/admin/refresh-failures",
            get(matching::handle_refresh_failures),
        )
        .with_state(state)
}
