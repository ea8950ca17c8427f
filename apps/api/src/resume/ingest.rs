//! Background resume processing: extract text, parse it with the LLM, and
//! upsert the result into the document store.

use bytes::Bytes;
use serde_json::Value;
use tracing::{error, info};

use crate::documents::DocumentStore;
use crate::errors::AppError;
use crate::extract::extract_text;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::LlmClient;
use crate::resume::prompts::{RESUME_FIELDS, RESUME_PARSE_OPTIONS, RESUME_PARSE_PROMPT_TEMPLATE};

/// Upper bound on resume text sent to the parser, in characters.
const MAX_RESUME_CHARS: usize = 24_000;

pub fn build_parse_prompt(resume_text: &str) -> String {
    let text: String = resume_text.chars().take(MAX_RESUME_CHARS).collect();
    RESUME_PARSE_PROMPT_TEMPLATE.replace("{resume_text}", &text)
}

/// Keeps only the expected keys; the parser must return an object.
pub fn normalize_parsed(parsed: Value) -> Result<Value, AppError> {
    let Value::Object(mut fields) = parsed else {
        return Err(AppError::Llm(
            "Resume parser returned a non-object JSON value".to_string(),
        ));
    };
    fields.retain(|key, _| RESUME_FIELDS.contains(&key.as_str()));
    Ok(Value::Object(fields))
}

pub async fn process_resume(
    llm: &LlmClient,
    documents: &DocumentStore,
    uid: &str,
    bytes: Bytes,
    content_type: &str,
) -> Result<(), AppError> {
    let text = extract_text(bytes, content_type).await?;
    if text.is_empty() {
        return Err(AppError::Validation(
            "No text could be extracted from the resume".to_string(),
        ));
    }
    info!(
        "Extracted {} characters from resume of user {}",
        text.len(),
        uid
    );

    let parsed: Value = llm
        .call_json(
            JSON_ONLY_SYSTEM,
            &build_parse_prompt(&text),
            RESUME_PARSE_OPTIONS,
        )
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let parsed = normalize_parsed(parsed)?;

    documents.save_parsed_resume(uid, parsed).await?;
    Ok(())
}

/// Runs `process_resume` detached from the request; failures are logged.
pub fn spawn_processing(
    llm: LlmClient,
    documents: DocumentStore,
    uid: String,
    bytes: Bytes,
    content_type: String,
) {
    tokio::spawn(async move {
        match process_resume(&llm, &documents, &uid, bytes, &content_type).await {
            Ok(()) => info!(
                "Resume parsed with {} for user {}",
                llm.chat_deployment(),
                uid
            ),
            Err(e) => error!("Resume processing failed for user {uid}: {e}"),
        }
    });
}
