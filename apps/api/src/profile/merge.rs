//! Profile merge: explicit input wins, then the parsed resume, then whatever
//! the user already had.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::user::User;

/// Body of `PUT /api/v1/users/me`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<i32>,
    pub key_skills: Option<Vec<String>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resume_text(resume: &Value, key: &str) -> Option<String> {
    non_blank(resume.get(key).and_then(Value::as_str).map(str::to_string))
}

/// Accepts `5`, `5.0`, or `"5"`; anything else is ignored.
fn resume_years(resume: &Value) -> Option<i32> {
    let years = match resume.get("Years of Experience")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    years.filter(|y| *y >= 0)
}

/// Accepts a JSON array of strings or a comma-separated string.
fn resume_skills(resume: &Value) -> Option<Vec<String>> {
    let skills: Vec<String> = match resume.get("Skills")? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .collect(),
        Value::String(s) => s.split(',').map(|s| s.trim().to_string()).collect(),
        _ => return None,
    };
    let skills: Vec<String> = skills.into_iter().filter(|s| !s.is_empty()).collect();
    (!skills.is_empty()).then_some(skills)
}

/// Applies `update` to `user`, falling back to `parsed_resume` for fields the
/// update leaves out, and recomputes `profile_completed`.
pub fn merge_profile(mut user: User, update: ProfileUpdate, parsed_resume: Option<&Value>) -> User {
    let empty = Value::Null;
    let resume = parsed_resume.unwrap_or(&empty);

    if let Some(name) = non_blank(update.full_name).or_else(|| resume_text(resume, "Name")) {
        user.full_name = Some(name);
    }
    if let Some(phone) =
        non_blank(update.phone_number).or_else(|| resume_text(resume, "Phone Number"))
    {
        user.phone_number = Some(phone);
    }
    if let Some(location) = non_blank(update.location).or_else(|| resume_text(resume, "Location")) {
        user.location = Some(location);
    }
    if let Some(years) = update
        .years_of_experience
        .filter(|y| *y >= 0)
        .or_else(|| resume_years(resume))
    {
        user.years_of_experience = Some(years);
    }
    if let Some(skills) = update
        .key_skills
        .filter(|s| !s.is_empty())
        .or_else(|| resume_skills(resume))
    {
        user.key_skills = skills;
    }

    user.profile_completed = profile_completed(&user);
    user
}

pub fn profile_completed(user: &User) -> bool {
    user.full_name.is_some()
        && user.phone_number.is_some()
        && user.location.is_some()
        && user.years_of_experience.is_some()
        && !user.key_skills.is_empty()
}
