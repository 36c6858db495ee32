//! Public entry points: document processing, normalization, classification.
//!
//! [`DocumentPipeline::from_config`] wires the concrete backends; tests and
//! embedders can assemble a [`CascadeController`] themselves and use
//! [`DocumentPipeline::new`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cascade::{CascadeController, OcrBackends};
use crate::classifier;
use crate::config::{CloudVisionSettings, PipelineConfig};
use crate::error::{OcrError, PipelineError};
use crate::normalizer::FieldNormalizer;
use crate::ocr::cloud_vision::CloudVisionBackend;
use crate::ocr::google_auth::{GoogleAuth, ServiceAccount};
use crate::ocr::self_hosted::SelfHostedBackend;
use crate::ocr::tesseract::TesseractBackend;
use crate::ocr::OcrBackend;
use crate::openrouter::OpenRouterClient;
use crate::pdf::LopdfTextSource;
use crate::schema::{DocumentTypeInfo, ExtractionResult, NormalizedFields, RawFieldMap};
use crate::scorer::CompletenessScorer;
use crate::structurer::{FieldStructurer, LlmStructurer, RegexStructurer};

pub struct DocumentPipeline {
    cascade: CascadeController,
    normalizer: FieldNormalizer,
}

impl DocumentPipeline {
    pub fn new(cascade: CascadeController, normalizer: FieldNormalizer) -> Self {
        Self {
            cascade,
            normalizer,
        }
    }

    /// Build the production pipeline. Missing optional backends disable
    /// their stage instead of failing.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.backend_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let cloud = match &config.cloud_vision {
            Some(settings) => match cloud_backend(settings, client.clone()) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!("Cloud OCR stage disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        let self_hosted = config.sidecar_url.as_ref().map(|url| {
            Arc::new(SelfHostedBackend::new(url.as_str(), client.clone())) as Arc<dyn OcrBackend>
        });

        let backends = OcrBackends {
            cloud,
            self_hosted,
            local: Arc::new(TesseractBackend::new(
                config.tesseract_path.as_str(),
                config.tesseract_lang.as_str(),
            )),
        };

        let structurer: Arc<dyn FieldStructurer> = if config.use_llm_structurer {
            let mut client = OpenRouterClient::from_env(config.backend_timeout)?;
            if let Some(model) = &config.openrouter_model {
                client = client.with_model(model.as_str());
            }
            info!("Using LLM field structurer");
            Arc::new(LlmStructurer::new(client))
        } else {
            Arc::new(RegexStructurer::new())
        };

        let cascade = CascadeController::new(
            Arc::new(LopdfTextSource),
            backends,
            structurer,
            Arc::new(CompletenessScorer),
        )
        .with_timeout(config.backend_timeout);

        Ok(Self::new(
            cascade,
            FieldNormalizer::new(config.normalizer.clone()),
        ))
    }

    /// Extract a scored credential record from uploaded bytes.
    pub async fn process_document(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        self.cascade.process(data, mime_type).await
    }

    pub fn normalize(&self, fields: &RawFieldMap) -> NormalizedFields {
        self.normalizer.normalize(fields)
    }

    pub fn classify(&self, text: &str) -> DocumentTypeInfo {
        classifier::classify(text)
    }
}

fn cloud_backend(
    settings: &CloudVisionSettings,
    client: reqwest::Client,
) -> Result<Arc<dyn OcrBackend>, OcrError> {
    let auth = match settings {
        CloudVisionSettings::ApiKey(key) => GoogleAuth::ApiKey(key.clone()),
        CloudVisionSettings::ServiceAccount(path) => GoogleAuth::ServiceAccount(
            ServiceAccount::from_key_file(path)
                .map_err(|e| OcrError::NotConfigured(format!("{:#}", e)))?,
        ),
    };
    let backend: Arc<dyn OcrBackend> = Arc::new(CloudVisionBackend::new(auth, client));
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{fields, DocumentType, ExtractionMethod};

    fn offline_config() -> PipelineConfig {
        PipelineConfig {
            tesseract_path: "/nonexistent/tesseract".to_string(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_unreadable_service_account_disables_cloud_stage() {
        let settings = CloudVisionSettings::ServiceAccount("/nonexistent/sa.json".to_string());
        let result = cloud_backend(&settings, reqwest::Client::new());
        assert!(matches!(result, Err(OcrError::NotConfigured(_))));

        let config = PipelineConfig {
            cloud_vision: Some(settings),
            ..offline_config()
        };
        assert!(DocumentPipeline::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_garbage_upload_is_unprocessable() {
        let pipeline = DocumentPipeline::from_config(&offline_config()).unwrap();
        let err = pipeline
            .process_document(b"\x00\x01\x02garbage", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnprocessableDocument(_)));
    }

    #[tokio::test]
    async fn test_missing_tesseract_still_yields_result() {
        let pipeline = DocumentPipeline::from_config(&offline_config()).unwrap();
        let mut png = Vec::new();
        image::DynamicImage::new_luma8(8, 8)
            .write_to(
                &mut std::io::Cursor::new(&mut png),
                image::ImageOutputFormat::Png,
            )
            .unwrap();

        let result = pipeline.process_document(&png, "image/png").await.unwrap();
        assert_eq!(result.extraction_method, ExtractionMethod::LocalOcrFallback);
        assert_eq!(result.confidence_score, 0.0);
        assert!(result.requires_review);
    }

    #[test]
    fn test_normalize_and_classify_delegate() {
        let pipeline = DocumentPipeline::from_config(&offline_config()).unwrap();

        let mut raw = RawFieldMap::new();
        raw.insert(fields::RECIPIENT.to_string(), "Doe, Jane".to_string());
        let normalized = pipeline.normalize(&raw);
        assert_eq!(normalized.name.as_deref(), Some("Jane Doe"));

        let info = pipeline.classify("Official Transcript\nSemester 1\nGPA: 3.8");
        assert_eq!(info.doc_type, DocumentType::Transcript);
    }
}
