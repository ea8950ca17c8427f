//! Axum route handlers for the users and candidates API.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{AuthUser, Role};
use crate::errors::AppError;
use crate::matching::refresh::RefreshTask;
use crate::matching::summary::user_summary;
use crate::models::user::{User, USER_COLUMNS};
use crate::profile::merge::{merge_profile, ProfileUpdate};
use crate::profile::search::{search_candidates, CandidateFilter};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CurrentUser {
    pub uid: String,
    pub email: Option<String>,
    pub role: String,
}

pub async fn load_user(state: &AppState, uid: &str) -> Result<User, AppError> {
    let user: Option<User> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"))
            .bind(uid)
            .fetch_optional(&state.db)
            .await?;
    user.ok_or_else(|| AppError::NotFound(format!("User {uid} not found")))
}

/// POST /api/v1/users/me
pub async fn handle_register(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<User>), AppError> {
    let role = user
        .role()
        .ok_or_else(|| AppError::Forbidden(format!("Unknown role '{}'", user.identity.role)))?;
    let email = user
        .identity
        .email
        .clone()
        .ok_or_else(|| AppError::Validation("Token carries no email".to_string()))?;

    let inserted = sqlx::query(
        "INSERT INTO users (uid, email, role) VALUES ($1, $2, $3) ON CONFLICT (uid) DO NOTHING",
    )
    .bind(user.uid())
    .bind(&email)
    .bind(role.as_str())
    .execute(&state.db)
    .await?
    .rows_affected();

    let status = if inserted == 1 {
        info!("Registered {} {}", role.as_str(), user.uid());
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(load_user(&state, user.uid()).await?)))
}

/// GET /api/v1/users/me
pub async fn handle_me(user: AuthUser) -> Json<CurrentUser> {
    Json(CurrentUser {
        uid: user.identity.subject_id,
        email: user.identity.email,
        role: user.identity.role,
    })
}

/// PUT /api/v1/users/me
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let uid = user.uid();
    let current = load_user(&state, uid).await?;

    let parsed_resume = match state.documents.parsed_resume(uid).await {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Parsed resume unavailable for user {uid}, merging without it: {e}");
            None
        }
    };
    if parsed_resume.is_none() {
        info!("No parsed resume on file for user {uid}");
    }

    let merged = merge_profile(current, update, parsed_resume.as_ref());

    sqlx::query(
        r#"
        UPDATE users
        SET full_name = $1, phone_number = $2, location = $3,
            years_of_experience = $4, key_skills = $5, profile_completed = $6
        WHERE uid = $7
        "#,
    )
    .bind(&merged.full_name)
    .bind(&merged.phone_number)
    .bind(&merged.location)
    .bind(merged.years_of_experience)
    .bind(&merged.key_skills)
    .bind(merged.profile_completed)
    .bind(uid)
    .execute(&state.db)
    .await?;

    info!(
        "Profile updated for user {} (complete: {})",
        uid, merged.profile_completed
    );

    state
        .refresh
        .submit(RefreshTask::user(uid, user_summary(&merged)));

    Ok(Json(merged))
}

/// GET /api/v1/candidates
pub async fn handle_search_candidates(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<CandidateFilter>,
) -> Result<Json<Vec<User>>, AppError> {
    user.require(Role::Recruiter)?;
    let candidates = search_candidates(&state.db, &filter).await?;
    Ok(Json(candidates))
}
