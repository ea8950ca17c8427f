//! Input validation and field merging for job listings. Pure functions; the
//! handlers own all database access.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::summary::job_summary;
use crate::models::job::JobListing;

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub key_skills: Vec<String>,
    pub experience_required: i32,
    pub location: String,
    pub company_name: String,
}

/// Body of `PATCH /api/v1/jobs/:id`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub key_skills: Option<Vec<String>>,
    pub experience_required: Option<i32>,
    pub location: Option<String>,
    pub company_name: Option<String>,
    pub is_active: Option<bool>,
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn clean_skills(skills: Vec<String>) -> Vec<String> {
    skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn check_experience(years: i32) -> Result<i32, AppError> {
    if years < 0 {
        return Err(AppError::Validation(
            "experience_required must be >= 0".to_string(),
        ));
    }
    Ok(years)
}

/// Validates `input` and builds the listing it describes, summary included.
pub fn new_listing(input: NewJob, recruiter_id: &str) -> Result<JobListing, AppError> {
    let mut job = JobListing {
        id: Uuid::new_v4(),
        title: required("title", &input.title)?,
        description: required("description", &input.description)?,
        key_skills: clean_skills(input.key_skills),
        experience_required: check_experience(input.experience_required)?,
        location: required("location", &input.location)?,
        company_name: required("company_name", &input.company_name)?,
        is_active: true,
        recruiter_id: recruiter_id.to_string(),
        job_summary: None,
        applied_user_ids: vec![],
        created_at: Utc::now(),
    };
    job.job_summary = Some(job_summary(&job));
    Ok(job)
}

/// Applies `patch` to `job` and refreshes its summary.
pub fn apply_patch(mut job: JobListing, patch: JobPatch) -> Result<JobListing, AppError> {
    if let Some(title) = patch.title {
        job.title = required("title", &title)?;
    }
    if let Some(description) = patch.description {
        job.description = required("description", &description)?;
    }
    if let Some(skills) = patch.key_skills {
        job.key_skills = clean_skills(skills);
    }
    if let Some(years) = patch.experience_required {
        job.experience_required = check_experience(years)?;
    }
    if let Some(location) = patch.location {
        job.location = required("location", &location)?;
    }
    if let Some(company) = patch.company_name {
        job.company_name = required("company_name", &company)?;
    }
    if let Some(active) = patch.is_active {
        job.is_active = active;
    }
    job.job_summary = Some(job_summary(&job));
    Ok(job)
}
