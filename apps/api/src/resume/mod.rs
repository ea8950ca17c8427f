// Resume ingestion: upload to object storage, then extract and parse the
// text in the background into the document store.

pub mod handlers;
pub mod ingest;
pub mod prompts;
