use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::user::{User, USER_COLUMNS};

/// Query string of `GET /api/v1/candidates`. `skills` is comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct CandidateFilter {
    pub skills: Option<String>,
    pub location: Option<String>,
    pub min_experience: Option<i32>,
}

impl CandidateFilter {
    pub fn skill_list(&self) -> Vec<String> {
        self.skills
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn location(&self) -> Option<&str> {
        self.location.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Candidates whose skills overlap the filter's, at the exact location, with
/// at least `min_experience` years. Absent filters match everyone.
pub fn candidate_query(filter: &CandidateFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {USER_COLUMNS} FROM users WHERE role = 'candidate'"
    ));

    let skills = filter.skill_list();
    if !skills.is_empty() {
        query.push(" AND key_skills && ").push_bind(skills);
    }
    if let Some(location) = filter.location() {
        query.push(" AND location = ").push_bind(location);
    }
    if let Some(min) = filter.min_experience {
        query.push(" AND years_of_experience >= ").push_bind(min);
    }
    query.push(" ORDER BY created_at DESC");
    query
}

pub async fn search_candidates(db: &PgPool, filter: &CandidateFilter) -> Result<Vec<User>, sqlx::Error> {
    candidate_query(filter).build_query_as::<User>().fetch_all(db).await
}
