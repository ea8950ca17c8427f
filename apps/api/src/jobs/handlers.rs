//! Axum route handlers for the job listings API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AuthUser, Role};
use crate::errors::AppError;
use crate::jobs::ranking::{combine_ranked, RankedCandidate};
use crate::jobs::service::{apply_patch, new_listing, JobPatch, NewJob};
use crate::matching::refresh::RefreshTask;
use crate::models::job::{JobListing, JOB_COLUMNS};
use crate::models::user::{User, USER_COLUMNS};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RankedQuery {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RankedResponse {
    pub candidates: Vec<RankedCandidate>,
}

async fn load_job(state: &AppState, id: Uuid) -> Result<JobListing, AppError> {
    let job: Option<JobListing> =
        sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM job_listings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&state.db)
            .await?;
    job.ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

fn require_owner(user: &AuthUser, job: &JobListing) -> Result<(), AppError> {
    user.require(Role::Recruiter)?;
    if job.recruiter_id != user.uid() {
        warn!(
            "Recruiter {} tried to access job {} owned by someone else",
            user.uid(),
            job.id
        );
        return Err(AppError::Forbidden("You do not own this job".to_string()));
    }
    Ok(())
}

fn submit_refresh(state: &AppState, job: &JobListing) {
    if let Some(summary) = &job.job_summary {
        state.refresh.submit(RefreshTask::job(job.id, summary.clone()));
    }
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewJob>,
) -> Result<(StatusCode, Json<JobListing>), AppError> {
    user.require(Role::Recruiter)?;
    let listing = new_listing(req, user.uid())?;

    let job: JobListing = sqlx::query_as(&format!(
        r#"
        INSERT INTO job_listings
            (id, title, description, key_skills, experience_required, location,
             company_name, is_active, recruiter_id, job_summary, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(listing.id)
    .bind(&listing.title)
    .bind(&listing.description)
    .bind(&listing.key_skills)
    .bind(listing.experience_required)
    .bind(&listing.location)
    .bind(&listing.company_name)
    .bind(listing.is_active)
    .bind(&listing.recruiter_id)
    .bind(&listing.job_summary)
    .bind(listing.created_at)
    .fetch_one(&state.db)
    .await?;

    info!("Job {} created by recruiter {}", job.id, user.uid());
    submit_refresh(&state, &job);
    Ok((StatusCode::CREATED, Json(job)))
}

/// PATCH /api/v1/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<JobPatch>,
) -> Result<Json<JobListing>, AppError> {
    let current = load_job(&state, id).await?;
    require_owner(&user, &current)?;
    let updated = apply_patch(current, patch)?;

    let job: JobListing = sqlx::query_as(&format!(
        r#"
        UPDATE job_listings
        SET title = $1, description = $2, key_skills = $3, experience_required = $4,
            location = $5, company_name = $6, is_active = $7, job_summary = $8
        WHERE id = $9
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(&updated.title)
    .bind(&updated.description)
    .bind(&updated.key_skills)
    .bind(updated.experience_required)
    .bind(&updated.location)
    .bind(&updated.company_name)
    .bind(updated.is_active)
    .bind(&updated.job_summary)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    info!("Job {} updated by recruiter {}", id, user.uid());
    submit_refresh(&state, &job);
    Ok(Json(job))
}

/// GET /api/v1/jobs/recruiter
pub async fn handle_recruiter_jobs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobListing>>, AppError> {
    user.require(Role::Recruiter)?;
    let jobs: Vec<JobListing> = sqlx::query_as(&format!(
        "SELECT {JOB_COLUMNS} FROM job_listings WHERE recruiter_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user.uid())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(jobs))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobListing>, AppError> {
    Ok(Json(load_job(&state, id).await?))
}

/// POST /api/v1/jobs/:id/apply
pub async fn handle_apply(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    user.require(Role::Candidate)?;
    let uid = user.uid();

    // Append and duplicate check in one statement so concurrent applies
    // cannot both land.
    let applied = sqlx::query(
        r#"
        UPDATE job_listings
        SET applied_user_ids = array_append(applied_user_ids, $1)
        WHERE id = $2 AND NOT ($1 = ANY(applied_user_ids))
        "#,
    )
    .bind(uid)
    .bind(id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if applied == 0 {
        load_job(&state, id).await?;
        info!("User {uid} already applied to job {id}");
        return Err(AppError::Conflict("Already applied to this job".to_string()));
    }

    info!("User {uid} applied to job {id}");
    Ok(Json(json!({ "message": "Application successful" })))
}

/// GET /api/v1/ranked-candidates?job_id=
pub async fn handle_ranked_candidates(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RankedQuery>,
) -> Result<Json<RankedResponse>, AppError> {
    let job = load_job(&state, query.job_id).await?;
    require_owner(&user, &job)?;

    if job.applied_user_ids.is_empty() {
        info!("No applicants for job {}", job.id);
        return Ok(Json(RankedResponse { candidates: vec![] }));
    }

    let scores = state
        .recommender
        .scores()
        .scores_for_job(job.id, &job.applied_user_ids)
        .await?;
    if scores.is_empty() {
        return Ok(Json(RankedResponse { candidates: vec![] }));
    }

    let uids: Vec<String> = scores.iter().map(|(uid, _)| uid.clone()).collect();
    let users: Vec<User> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ANY($1)"))
            .bind(&uids)
            .fetch_all(&state.db)
            .await?;

    let candidates = combine_ranked(scores, users);
    info!(
        "{} ranked candidates returned for job {}",
        candidates.len(),
        job.id
    );
    Ok(Json(RankedResponse { candidates }))
}
