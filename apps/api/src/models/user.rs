use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Columns selected into `User`. The embedding column is read only by the
/// matching core.
pub const USER_COLUMNS: &str = "uid, email, role, full_name, phone_number, resume_url, \
    location, years_of_experience, key_skills, profile_completed, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub resume_url: Option<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<i32>,
    pub key_skills: Vec<String>,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
}
