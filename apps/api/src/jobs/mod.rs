// Job listings: recruiter CRUD, candidate applications, and the ranked
// applicant view backed by cached match scores.

pub mod handlers;
pub mod ranking;
pub mod service;
