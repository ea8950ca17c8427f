use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const JOB_COLUMNS: &str = "id, title, description, key_skills, experience_required, \
    location, company_name, is_active, recruiter_id, job_summary, applied_user_ids, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobListing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub key_skills: Vec<String>,
    pub experience_required: i32,
    pub location: String,
    pub company_name: String,
    pub is_active: bool,
    pub recruiter_id: String,
    pub job_summary: Option<String>,
    /// Candidate uids that applied. Visible only to the owning recruiter.
    #[serde(skip_serializing)]
    pub applied_user_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
