use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::auth::{AuthUser, Role};
use crate::errors::AppError;
use crate::extract::{MIME_DOCX, MIME_PDF};
use crate::profile::handlers::load_user;
use crate::resume::ingest::spawn_processing;
use crate::state::AppState;
use crate::storage::upload_resume;

const ACCEPTED_TYPES: [&str; 2] = [MIME_PDF, MIME_DOCX];

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub file_url: String,
}

struct UploadedFile {
    filename: String,
    content_type: String,
    bytes: Bytes,
}

async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("resume").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }
    Err(AppError::Validation("Missing multipart field 'file'".to_string()))
}

/// POST /api/v1/upload/resume
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    user.require(Role::Candidate)?;
    let uid = user.uid().to_string();

    let file = read_file_field(&mut multipart).await?;
    if !ACCEPTED_TYPES.contains(&file.content_type.as_str()) {
        return Err(AppError::Validation(
            "Only PDF and DOCX files are allowed".to_string(),
        ));
    }
    if file.bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    // Checked before the upload so a missing user leaves no orphaned object.
    load_user(&state, &uid).await?;

    let stored = upload_resume(
        &state.s3,
        &state.config.s3_bucket,
        &state.config.s3_endpoint,
        &uid,
        &file.filename,
        &file.content_type,
        file.bytes.clone(),
    )
    .await?;

    let updated = sqlx::query("UPDATE users SET resume_url = $1 WHERE uid = $2")
        .bind(&stored.url)
        .bind(&uid)
        .execute(&state.db)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound(format!("User {uid} not found")));
    }
    info!("Resume URL recorded for user {uid}: {}", stored.key);

    spawn_processing(
        state.llm.clone(),
        state.documents.clone(),
        uid,
        file.bytes,
        file.content_type,
    );

    Ok(Json(UploadResponse {
        message: "Resume uploaded successfully!".to_string(),
        file_url: stored.url,
    }))
}
