//! Error taxonomy for the extraction pipeline.

use thiserror::Error;

/// Failure of a single OCR backend call.
///
/// Every variant is recoverable inside the cascade: the stage is discarded
/// and the next one is attempted. "No text found" is not an error; backends
/// return an empty [`crate::ocr::OcrText`] for that.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {0}s")]
    Timeout(u64),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl OcrError {
    /// Map an HTTP status from a backend into the matching variant.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth(format!("{}: {}", status, body)),
            429 => Self::Quota(format!("{}: {}", status, body)),
            _ => Self::Unavailable(format!("{}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for OcrError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

/// The only failure `process_document` surfaces to callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unprocessable document: {0}")]
    UnprocessableDocument(String),
}
