//! Plain-text extraction from uploaded resumes (PDF, DOCX, plain text).

use std::io::{Cursor, Read};

use bytes::Bytes;
use thiserror::Error;

use crate::errors::AppError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content type '{0}'")]
    Unsupported(String),

    #[error("failed to read PDF: {0}")]
    Pdf(String),

    #[error("failed to read DOCX: {0}")]
    Docx(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Unsupported(mime) => {
                AppError::UnsupportedMedia(format!("Cannot extract text from '{mime}'"))
            }
            ExtractError::Pdf(msg) | ExtractError::Docx(msg) => AppError::Validation(msg),
            ExtractError::Task(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Extracts text on the blocking pool; PDF parsing is CPU-bound.
pub async fn extract_text(bytes: Bytes, content_type: &str) -> Result<String, ExtractError> {
    let content_type = content_type.to_string();
    tokio::task::spawn_blocking(move || extract_text_blocking(&bytes, &content_type))
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?
}

pub fn extract_text_blocking(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let text = match content_type {
        MIME_PDF => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?
        }
        MIME_DOCX => extract_docx(bytes)?,
        MIME_TEXT => String::from_utf8_lossy(bytes).into_owned(),
        other => return Err(ExtractError::Unsupported(other.to_string())),
    };
    Ok(text.trim().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    Ok(docx_xml_to_text(&xml))
}

/// Joins the `<w:t>` runs of each `<w:p>` paragraph, one paragraph per line.
fn docx_xml_to_text(xml: &str) -> String {
    xml.split("</w:p>")
        .map(paragraph_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(fragment: &str) -> String {
    let mut text = String::new();
    let mut rest = fragment;
    while let Some(start) = rest.find("<w:t") {
        let after = &rest[start + 4..];
        // Skip <w:tab/>, <w:tbl>, <w:tc> and friends.
        if !after.starts_with('>') && !after.starts_with(' ') {
            rest = after;
            continue;
        }
        let Some(open_end) = after.find('>') else {
            break;
        };
        let body = &after[open_end + 1..];
        let Some(close) = body.find("</w:t>") else {
            break;
        };
        text.push_str(&unescape_xml(&body[..close]));
        rest = &body[close + 6..];
    }
    text
}

/// Decodes the predefined entities and numeric character references
/// (`&#8217;`, `&#x2013;`) in one pass. Anything unrecognised is kept as is.
fn unescape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let decoded = candidate
            .find(';')
            .and_then(|semi| decode_entity(&candidate[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}
