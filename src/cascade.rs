//! Extraction cascade.
//!
//! Tries progressively cheaper and less accurate text sources until one
//! produces a result good enough to accept:
//!
//! 1. PDF text layer (accepted when the scorer calls it high confidence)
//! 2. Cloud Vision OCR (accepted above [`CLOUD_VISION_ACCEPT`])
//! 3. Self-hosted OCR sidecar (accepted above [`SELF_HOSTED_ACCEPT`])
//! 4. Local Tesseract, whose output is always returned
//!
//! Backend failures and timeouts never abort the cascade; they are logged
//! and the next stage runs. The only fatal outcome is an input that cannot
//! be prepared for OCR at all. PDF parsing and image preprocessing run on
//! the blocking pool under the same per-call timeout as backend calls.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::error::{OcrError, PipelineError};
use crate::ocr::{BackendKind, OcrBackend, OcrText};
use crate::pdf::NativeTextSource;
use crate::preprocess::{self, PreparedImage, PDF_MIME};
use crate::schema::{fields, ExtractionMethod, ExtractionResult};
use crate::scorer::Scorer;
use crate::structurer::FieldStructurer;

/// Cloud results must score strictly above this to be accepted.
pub const CLOUD_VISION_ACCEPT: f64 = 0.8;

/// Self-hosted results must score strictly above this to be accepted.
pub const SELF_HOSTED_ACCEPT: f64 = 0.6;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OCR backends by cascade slot. Unconfigured optional slots are skipped.
#[derive(Clone)]
pub struct OcrBackends {
    pub cloud: Option<Arc<dyn OcrBackend>>,
    pub self_hosted: Option<Arc<dyn OcrBackend>>,
    pub local: Arc<dyn OcrBackend>,
}

impl OcrBackends {
    fn slot(&self, kind: BackendKind) -> Option<&Arc<dyn OcrBackend>> {
        match kind {
            BackendKind::CloudVision => self.cloud.as_ref(),
            BackendKind::SelfHosted => self.self_hosted.as_ref(),
            BackendKind::Tesseract => Some(&self.local),
        }
    }
}

/// Minimum score an OCR stage needs for its result to be returned.
/// `None` means the stage is terminal and always accepted.
pub fn acceptance_threshold(kind: BackendKind) -> Option<f64> {
    match kind {
        BackendKind::CloudVision => Some(CLOUD_VISION_ACCEPT),
        BackendKind::SelfHosted => Some(SELF_HOSTED_ACCEPT),
        BackendKind::Tesseract => None,
    }
}

pub struct CascadeController {
    native: Arc<dyn NativeTextSource>,
    backends: OcrBackends,
    structurer: Arc<dyn FieldStructurer>,
    scorer: Arc<dyn Scorer>,
    timeout: Duration,
}

impl CascadeController {
    pub fn new(
        native: Arc<dyn NativeTextSource>,
        backends: OcrBackends,
        structurer: Arc<dyn FieldStructurer>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            native,
            backends,
            structurer,
            scorer,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound applied to each individual backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the cascade over one document.
    pub async fn process(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        };
        info!(
            "Processing document {} ({}, {} bytes)",
            &fingerprint[..12],
            mime_type,
            data.len()
        );

        let data: Arc<[u8]> = Arc::from(data);

        if mime_type == PDF_MIME {
            if let Some(result) = self.native_stage(Arc::clone(&data)).await {
                return Ok(result);
            }
        }

        let mime = mime_type.to_string();
        let prepared = self
            .run_blocking("Preprocessing", move || preprocess::prepare(&data, &mime))
            .await;
        let image = match prepared {
            Some(prepared) => prepared?,
            None => return Ok(self.fallback_result(OcrText::default()).await),
        };

        for kind in [BackendKind::CloudVision, BackendKind::SelfHosted] {
            let Some(backend) = self.backends.slot(kind) else {
                debug!("Stage {} not configured, skipping", kind.name());
                continue;
            };
            match self.ocr_stage(kind, backend.as_ref(), &image).await {
                Ok(result) if accepts(kind, result.confidence_score) => {
                    info!(
                        "Accepted {} result for {} (confidence {:.2})",
                        kind.name(),
                        &fingerprint[..12],
                        result.confidence_score
                    );
                    return Ok(result);
                }
                Ok(result) => info!(
                    "Stage {} below threshold (confidence {:.2}), continuing",
                    kind.name(),
                    result.confidence_score
                ),
                Err(e) => warn!("Stage {} failed: {}", kind.name(), e),
            }
        }

        Ok(self.local_stage(&image).await)
    }

    /// PDF text layer. `None` when there is no usable text or the result
    /// is not confident enough.
    async fn native_stage(&self, data: Arc<[u8]>) -> Option<ExtractionResult> {
        let native = Arc::clone(&self.native);
        let extracted = self
            .run_blocking("Native text extraction", move || native.extract_text(&data))
            .await?;
        let text = match extracted {
            Ok(text) => text,
            Err(e) => {
                warn!("Native text extraction failed: {:#}", e);
                return None;
            }
        };
        if text.trim().is_empty() {
            debug!("No text layer, falling through to OCR");
            return None;
        }

        let result = self
            .structure_and_score(OcrText::plain(text), ExtractionMethod::NativeText)
            .await;
        if self.scorer.is_high_confidence(&result) {
            info!(
                "Accepted native text result (confidence {:.2})",
                result.confidence_score
            );
            Some(result)
        } else {
            info!(
                "Native text not conclusive (confidence {:.2}), falling through to OCR",
                result.confidence_score
            );
            None
        }
    }

    async fn ocr_stage(
        &self,
        kind: BackendKind,
        backend: &dyn OcrBackend,
        image: &PreparedImage,
    ) -> Result<ExtractionResult, OcrError> {
        let ocr = self.call_backend(backend, image).await?;
        Ok(self.structure_and_score(ocr, kind.method()).await)
    }

    /// Terminal stage. Always yields a result, even from no text.
    async fn local_stage(&self, image: &PreparedImage) -> ExtractionResult {
        let ocr = match self.call_backend(self.backends.local.as_ref(), image).await {
            Ok(ocr) => ocr,
            Err(e) => {
                warn!("Local OCR failed, returning empty result for review: {}", e);
                OcrText::default()
            }
        };
        self.fallback_result(ocr).await
    }

    async fn fallback_result(&self, ocr: OcrText) -> ExtractionResult {
        let result = self
            .structure_and_score(ocr, BackendKind::Tesseract.method())
            .await;
        info!(
            "Returning local fallback result (confidence {:.2}, review={})",
            result.confidence_score, result.requires_review
        );
        result
    }

    /// CPU-bound work on the blocking pool. `None` on timeout or panic.
    async fn run_blocking<T, F>(&self, what: &str, work: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} task failed: {}", what, e);
                None
            }
            Err(_) => {
                warn!("{} timed out after {:?}", what, self.timeout);
                None
            }
        }
    }

    async fn call_backend(
        &self,
        backend: &dyn OcrBackend,
        image: &PreparedImage,
    ) -> Result<OcrText, OcrError> {
        debug!("Calling {} backend", backend.kind().name());
        match tokio::time::timeout(self.timeout, backend.extract(image)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn structure_and_score(&self, ocr: OcrText, method: ExtractionMethod) -> ExtractionResult {
        let info = classifier::classify(&ocr.text);
        debug!(
            "Classified as {} (confidence {:.2})",
            info.doc_type, info.confidence
        );

        let mut fields = self
            .structurer
            .structure_text(&ocr.text, &info.extraction_hints)
            .await;

        let has_institution = fields
            .get(fields::INSTITUTION)
            .map_or(false, |v| !v.trim().is_empty());
        if !has_institution {
            if let Some(logo) = ocr.logos.into_iter().next() {
                debug!("Institution taken from detected logo: {}", logo);
                fields.insert(fields::INSTITUTION.to_string(), logo);
            }
        }

        let result = self.scorer.score_result(&fields, method, info.doc_type);
        debug!(
            "Stage {} scored {:.2} with {} fields",
            method,
            result.confidence_score,
            fields.len()
        );
        result
    }
}

fn accepts(kind: BackendKind, confidence: f64) -> bool {
    acceptance_threshold(kind).map_or(true, |threshold| confidence > threshold)
}
