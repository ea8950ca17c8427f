use axum::{extract::State, Json};
use tracing::{error, info};

use crate::auth::{AuthUser, Role};
use crate::errors::AppError;
use crate::matching::recommender::JobMatch;
use crate::matching::refresh::RefreshFailure;
use crate::matching::MatchError;
use crate::state::AppState;

fn log_failure(uid: &str, err: MatchError) -> AppError {
    error!(
        "Recommendation for user {} failed ({}): {}",
        uid,
        err.kind(),
        err
    );
    err.into()
}

/// GET /api/v1/match-scores/recommendations
pub async fn handle_recommendations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobMatch>>, AppError> {
    user.require(Role::Candidate)?;
    let matches = state
        .recommender
        .recommend(user.uid())
        .await
        .map_err(|e| log_failure(user.uid(), e))?;
    info!(
        "Returning {} recommendations for user {}",
        matches.len(),
        user.uid()
    );
    Ok(Json(matches))
}

/// POST /api/v1/match-scores/recommendations/recompute
pub async fn handle_recompute(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobMatch>>, AppError> {
    user.require(Role::Candidate)?;
    let matches = state
        .recommender
        .recompute(user.uid())
        .await
        .map_err(|e| log_failure(user.uid(), e))?;
    Ok(Json(matches))
}

/// GET /api/v1/admin/refresh-failures
pub async fn handle_refresh_failures(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RefreshFailure>>, AppError> {
    user.require(Role::Recruiter)?;
    Ok(Json(state.refresh.failures()))
}
