//! OCR backend abstraction.
//!
//! Every backend exposes the same capability, [`OcrBackend::extract`]. The
//! set of backends is closed ([`BackendKind`]) and the cascade decides the
//! order in which they are tried.

pub mod cloud_vision;
pub mod google_auth;
pub mod self_hosted;
pub mod tesseract;

use crate::error::OcrError;
use crate::preprocess::PreparedImage;
use crate::schema::ExtractionMethod;

/// Text recognised by a backend. Empty text means "nothing found".
#[derive(Debug, Clone, Default)]
pub struct OcrText {
    pub text: String,
    /// Detected logo descriptions, best first.
    pub logos: Vec<String>,
}

impl OcrText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            logos: Vec::new(),
        }
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    async fn extract(&self, image: &PreparedImage) -> Result<OcrText, OcrError>;
}

/// Known backends, one per OCR stage of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    CloudVision,
    SelfHosted,
    Tesseract,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CloudVision => "cloud_vision",
            Self::SelfHosted => "self_hosted",
            Self::Tesseract => "tesseract",
        }
    }

    /// Tag carried by results this backend's stage produces.
    pub fn method(&self) -> ExtractionMethod {
        match self {
            Self::CloudVision => ExtractionMethod::CloudVision,
            Self::SelfHosted => ExtractionMethod::SelfHostedOcr,
            Self::Tesseract => ExtractionMethod::LocalOcrFallback,
        }
    }
}
