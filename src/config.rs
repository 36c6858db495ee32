//! Pipeline configuration.
//!
//! Backend settings come from the environment (`.env` is loaded by the
//! binary). Normalizer alias tables are built in, or loaded from a JSON file
//! named by `NORMALIZER_CONFIG`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backend and structurer settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cloud_vision: Option<CloudVisionSettings>,
    /// Base URL of the self-hosted OCR sidecar.
    pub sidecar_url: Option<String>,
    pub tesseract_path: String,
    pub tesseract_lang: String,
    /// Upper bound on every single backend call.
    pub backend_timeout: Duration,
    pub openrouter_model: Option<String>,
    pub use_llm_structurer: bool,
    pub normalizer: NormalizerConfig,
}

/// How the cloud OCR backend authenticates.
#[derive(Debug, Clone)]
pub enum CloudVisionSettings {
    ApiKey(String),
    /// Path to a Google service account JSON key.
    ServiceAccount(String),
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cloud_vision: None,
            sidecar_url: None,
            tesseract_path: "tesseract".to_string(),
            tesseract_lang: "eng".to_string(),
            backend_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            openrouter_model: None,
            use_llm_structurer: false,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        let cloud_vision = match (
            std::env::var("GOOGLE_SA_KEY_PATH").ok(),
            std::env::var("GOOGLE_VISION_API_KEY").ok(),
        ) {
            (Some(path), _) => Some(CloudVisionSettings::ServiceAccount(path)),
            (None, Some(key)) => Some(CloudVisionSettings::ApiKey(key)),
            (None, None) => None,
        };

        let backend_timeout = match std::env::var("OCR_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("OCR_TIMEOUT_SECS is not a number: {}", raw))?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let normalizer = match std::env::var("NORMALIZER_CONFIG") {
            Ok(path) => NormalizerConfig::load_from_file(Path::new(&path))?,
            Err(_) => NormalizerConfig::default(),
        };

        let config = Self {
            cloud_vision,
            sidecar_url: std::env::var("OCR_SIDECAR_URL").ok(),
            tesseract_path: std::env::var("TESSERACT_PATH")
                .unwrap_or_else(|_| "tesseract".to_string()),
            tesseract_lang: std::env::var("TESSERACT_LANG").unwrap_or_else(|_| "eng".to_string()),
            backend_timeout,
            openrouter_model: std::env::var("OPENROUTER_MODEL").ok(),
            use_llm_structurer: std::env::var("OPENROUTER_API_KEY").is_ok(),
            normalizer,
        };

        if config.cloud_vision.is_none() {
            warn!("No Google Vision credentials set, cloud OCR stage disabled");
        }
        if config.sidecar_url.is_none() {
            warn!("OCR_SIDECAR_URL not set, self-hosted OCR stage disabled");
        }
        info!(
            "Pipeline config: timeout={}s, tesseract={}, llm_structurer={}",
            config.backend_timeout.as_secs(),
            config.tesseract_path,
            config.use_llm_structurer
        );

        Ok(config)
    }
}

/// Alias tables for institution and degree canonicalisation.
///
/// Matching is a case-insensitive substring test in declaration order, so
/// longer, more specific aliases should come first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub institution_aliases: Vec<Alias>,
    #[serde(default)]
    pub degree_aliases: Vec<Alias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    pub canonical: String,
}

impl Alias {
    fn new(alias: &str, canonical: &str) -> Self {
        Self {
            alias: alias.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

impl NormalizerConfig {
    /// Load alias tables from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read normalizer config: {:?}", path))?;
        let config: NormalizerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse normalizer config: {:?}", path))?;
        info!(
            "Loaded normalizer config from {:?}: {} institution aliases, {} degree aliases",
            path,
            config.institution_aliases.len(),
            config.degree_aliases.len()
        );
        Ok(config)
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            institution_aliases: vec![
                Alias::new("massachusetts institute of technology", "Massachusetts Institute of Technology"),
                Alias::new("m.i.t.", "Massachusetts Institute of Technology"),
                Alias::new("harvard", "Harvard University"),
                Alias::new("stanford", "Stanford University"),
                Alias::new("caltech", "California Institute of Technology"),
                Alias::new("ucla", "University of California, Los Angeles"),
                Alias::new("uc berkeley", "University of California, Berkeley"),
                Alias::new("oxford", "University of Oxford"),
                Alias::new("cambridge", "University of Cambridge"),
                Alias::new("iit bombay", "Indian Institute of Technology Bombay"),
                Alias::new("iit delhi", "Indian Institute of Technology Delhi"),
                Alias::new("coursera", "Coursera"),
                Alias::new("udemy", "Udemy"),
            ],
            degree_aliases: vec![
                Alias::new("bachelor of science", "Bachelor of Science"),
                Alias::new("bachelor of arts", "Bachelor of Arts"),
                Alias::new("bachelor of technology", "Bachelor of Technology"),
                Alias::new("bachelor of engineering", "Bachelor of Engineering"),
                Alias::new("master of science", "Master of Science"),
                Alias::new("master of arts", "Master of Arts"),
                Alias::new("master of business administration", "Master of Business Administration"),
                Alias::new("doctor of philosophy", "Doctor of Philosophy"),
                Alias::new("b.sc", "Bachelor of Science"),
                Alias::new("bsc", "Bachelor of Science"),
                Alias::new("m.sc", "Master of Science"),
                Alias::new("msc", "Master of Science"),
                Alias::new("b.tech", "Bachelor of Technology"),
                Alias::new("btech", "Bachelor of Technology"),
                Alias::new("m.tech", "Master of Technology"),
                Alias::new("mtech", "Master of Technology"),
                Alias::new("b.e.", "Bachelor of Engineering"),
                Alias::new("b.a.", "Bachelor of Arts"),
                Alias::new("m.a.", "Master of Arts"),
                Alias::new("mba", "Master of Business Administration"),
                Alias::new("ph.d", "Doctor of Philosophy"),
                Alias::new("phd", "Doctor of Philosophy"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normalizer.json");
        std::fs::write(
            &path,
            r#"{"institution_aliases": [{"alias": "tu delft", "canonical": "Delft University of Technology"}]}"#,
        )
        .unwrap();

        let config = NormalizerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.institution_aliases.len(), 1);
        assert!(config.degree_aliases.is_empty());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = NormalizerConfig::load_from_file(Path::new("/nonexistent/normalizer.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert!(config.cloud_vision.is_none());
        assert_eq!(config.backend_timeout, Duration::from_secs(30));
        assert_eq!(config.tesseract_lang, "eng");
    }
}
