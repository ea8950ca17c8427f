use std::collections::HashMap;

use serde::Serialize;

use crate::models::user::User;

/// One applicant in the recruiter's ranked view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub uid: String,
    pub score: f64,
    pub full_name: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,
    pub resume_url: Option<String>,
    pub key_skills: Vec<String>,
    pub location: Option<String>,
    pub years_of_experience: Option<i32>,
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Joins `scores` (already in rank order) with the applicants' profiles.
/// Scores whose user row is gone are dropped; the order is preserved.
pub fn combine_ranked(scores: Vec<(String, f64)>, users: Vec<User>) -> Vec<RankedCandidate> {
    let mut users: HashMap<String, User> = users.into_iter().map(|u| (u.uid.clone(), u)).collect();
    scores
        .into_iter()
        .filter_map(|(uid, score)| {
            let user = users.remove(&uid)?;
            Some(RankedCandidate {
                uid,
                score: round4(score),
                full_name: user.full_name,
                email: user.email,
                phone_number: user.phone_number,
                resume_url: user.resume_url,
                key_skills: user.key_skills,
                location: user.location,
                years_of_experience: user.years_of_experience,
            })
        })
        .collect()
}
