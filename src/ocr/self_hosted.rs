//! Self-hosted OCR sidecar backend.
//!
//! The sidecar accepts a multipart upload on `/convert` and answers with
//! per-page text; it takes both images and PDFs.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use super::{BackendKind, OcrBackend, OcrText};
use crate::error::OcrError;
use crate::preprocess::PreparedImage;

/// Sidecar response (private deserialization types).
#[derive(Debug, Deserialize)]
struct SidecarResponse {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    pages: Vec<SidecarPage>,
}

#[derive(Debug, Deserialize)]
struct SidecarPage {
    page_num: u32,
    text: String,
}

impl SidecarResponse {
    fn into_text(self) -> String {
        if !self.markdown.trim().is_empty() {
            return self.markdown;
        }
        let mut pages = self.pages;
        pages.sort_by_key(|p| p.page_num);
        pages
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct SelfHostedBackend {
    url: String,
    client: reqwest::Client,
}

impl SelfHostedBackend {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OcrBackend for SelfHostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SelfHosted
    }

    async fn extract(&self, image: &PreparedImage) -> Result<OcrText, OcrError> {
        let part = Part::bytes(image.data.clone())
            .file_name(image.file_name())
            .mime_str(&image.mime_type)?;
        let form = Form::new().part("file", part);

        info!("SelfHosted: posting {} bytes to {}/convert", image.data.len(), self.url);

        let response = self
            .client
            .post(format!("{}/convert", self.url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OcrError::from_status(status, error_text));
        }

        let sidecar: SidecarResponse = response.json().await?;
        Ok(OcrText::plain(sidecar.into_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_markdown() {
        let resp: SidecarResponse = serde_json::from_str(
            r##"{"markdown": "# Diploma", "pages": [{"page_num": 1, "text": "Diploma"}]}"##,
        )
        .unwrap();
        assert_eq!(resp.into_text(), "# Diploma");
    }

    #[test]
    fn test_joins_pages_in_order() {
        let resp: SidecarResponse = serde_json::from_str(
            r#"{"pages": [{"page_num": 2, "text": "second"}, {"page_num": 1, "text": "first"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.into_text(), "first\n\nsecond");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = SelfHostedBackend::new("http://ocr:3001/", reqwest::Client::new());
        assert_eq!(backend.url, "http://ocr:3001");
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_unavailable() {
        let backend = SelfHostedBackend::new("http://127.0.0.1:1", reqwest::Client::new());
        let image = PreparedImage {
            data: vec![0u8; 8],
            mime_type: "image/png".to_string(),
            width: 1,
            height: 1,
        };
        assert!(matches!(
            backend.extract(&image).await,
            Err(OcrError::Unavailable(_))
        ));
    }
}
