use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

/// Where an uploaded resume ended up.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// `resumes/{uid}-resume-{timestamp}-{8 hex}.{ext}`; the extension comes from
/// the original filename.
pub fn resume_object_key(uid: &str, original_filename: &str) -> String {
    let ext = original_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!("resumes/{uid}-resume-{timestamp}-{}.{ext}", &unique[..8])
}

pub fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
}

/// Uploads resume bytes and returns the object's key and URL.
pub async fn upload_resume(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    endpoint: &str,
    uid: &str,
    original_filename: &str,
    content_type: &str,
    bytes: Bytes,
) -> Result<StoredObject, AppError> {
    let key = resume_object_key(uid, original_filename);
    s3.put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(bytes))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("S3 upload failed: {e}")))?;

    info!("Uploaded resume to s3://{}/{}", bucket, key);

    Ok(StoredObject {
        url: object_url(endpoint, bucket, &key),
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_key_layout() {
        let key = resume_object_key("u42", "My CV.PDF");
        assert!(key.starts_with("resumes/u42-resume-"), "{key}");
        assert!(key.ends_with(".pdf"), "{key}");
        // resumes/ + u42-resume- + 14 digit timestamp + - + 8 hex + .pdf
        let stem = key
            .trim_start_matches("resumes/u42-resume-")
            .trim_end_matches(".pdf");
        let (timestamp, unique) = stem.split_once('-').unwrap();
        assert_eq!(timestamp.len(), 14);
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn test_resume_key_without_extension() {
        assert!(resume_object_key("u1", "resume").ends_with(".bin"));
    }

    #[test]
    fn test_object_url_trims_endpoint_slash() {
        assert_eq!(
            object_url("http://localhost:4566/", "bucket", "resumes/a.pdf"),
            "http://localhost:4566/bucket/resumes/a.pdf"
        );
    }
}
