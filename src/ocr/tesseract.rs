//! Local Tesseract OCR via the CLI. No network access.

use std::io::Write;

use tokio::process::Command;
use tracing::{debug, info};

use super::{BackendKind, OcrBackend, OcrText};
use crate::error::OcrError;
use crate::preprocess::PreparedImage;

pub struct TesseractBackend {
    binary: String,
    language: String,
}

impl TesseractBackend {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

#[async_trait::async_trait]
impl OcrBackend for TesseractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tesseract
    }

    async fn extract(&self, image: &PreparedImage) -> Result<OcrText, OcrError> {
        if image.is_pdf() {
            return Err(OcrError::Unavailable(
                "tesseract cannot read PDF input".to_string(),
            ));
        }

        let mut file = tempfile::Builder::new()
            .prefix("ocr_input")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Unavailable(format!("failed to create temp file: {}", e)))?;
        file.write_all(&image.data)
            .map_err(|e| OcrError::Unavailable(format!("failed to write temp file: {}", e)))?;

        info!("Tesseract: running {} on {} bytes", self.binary, image.data.len());

        // tesseract input.png stdout -l eng
        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                OcrError::Unavailable(format!(
                    "failed to run tesseract (is it installed? path='{}'): {}",
                    self.binary, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Unavailable(format!(
                "tesseract exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Tesseract: recognised {} chars", text.len());
        Ok(OcrText::plain(text))
    }
}
