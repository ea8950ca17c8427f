//! Summary text fed to the embedding model.
//!
//! Field order is fixed and missing values render as `N/A` (or an empty list)
//! instead of being dropped, so every summary has the same shape.

use crate::models::job::JobListing;
use crate::models::user::User;

const MISSING: &str = "N/A";

pub fn user_summary(user: &User) -> String {
    format!(
        "Location: {}\nYears of Experience: {}\nKey Skills: {}",
        user.location.as_deref().unwrap_or(MISSING),
        user.years_of_experience
            .map(|y| y.to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        user.key_skills.join(", ")
    )
}

pub fn job_summary(job: &JobListing) -> String {
    format!(
        "Job Title: {}\nDescription: {}\nSkills: {}\nExperience Required: {} years\nLocation: {}",
        job.title.trim(),
        job.description.trim(),
        job.key_skills.join(", "),
        job.experience_required,
        job.location.trim()
    )
}
