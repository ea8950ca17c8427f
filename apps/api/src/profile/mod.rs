// User profiles: registration, profile merge with the parsed resume, and
// candidate search. Profile updates feed the embedding refresh pipeline.

pub mod handlers;
pub mod merge;
pub mod search;
