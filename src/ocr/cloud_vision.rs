//! Google Cloud Vision OCR backend (`images:annotate`).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::google_auth::{Credential, GoogleAuth};
use super::{BackendKind, OcrBackend, OcrText};
use crate::error::OcrError;
use crate::preprocess::PreparedImage;

const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

// google.rpc.Code values surfaced in per-image errors.
const RPC_PERMISSION_DENIED: i32 = 7;
const RPC_RESOURCE_EXHAUSTED: i32 = 8;
const RPC_UNAUTHENTICATED: i32 = 16;

pub struct CloudVisionBackend {
    auth: GoogleAuth,
    client: reqwest::Client,
    endpoint: String,
}

impl CloudVisionBackend {
    pub fn new(auth: GoogleAuth, client: reqwest::Client) -> Self {
        Self {
            auth,
            client,
            endpoint: ANNOTATE_URL.to_string(),
        }
    }
}

// ── Vision API request/response types ───────────────────────────────────────

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    feature_type: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(default)]
    logo_annotations: Vec<LogoAnnotation>,
    #[serde(default)]
    error: Option<RpcStatus>,
}

#[derive(Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct LogoAnnotation {
    description: String,
    #[serde(default)]
    score: f64,
}

#[derive(Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

// ── Backend implementation ──────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrBackend for CloudVisionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::CloudVision
    }

    async fn extract(&self, image: &PreparedImage) -> Result<OcrText, OcrError> {
        if image.is_pdf() {
            return Err(OcrError::InvalidResponse(
                "images:annotate does not accept PDF input".to_string(),
            ));
        }

        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(&image.data),
                },
                features: vec![
                    Feature {
                        feature_type: "DOCUMENT_TEXT_DETECTION",
                    },
                    Feature {
                        feature_type: "LOGO_DETECTION",
                    },
                ],
            }],
        };

        info!("CloudVision: calling images:annotate ({} bytes)", image.data.len());

        let credential = self
            .auth
            .credential(&self.client)
            .await
            .map_err(|e| OcrError::Auth(format!("{:#}", e)))?;
        let request = match credential {
            Credential::ApiKey(key) => self.client.post(&self.endpoint).query(&[("key", key)]),
            Credential::Bearer(token) => self.client.post(&self.endpoint).bearer_auth(token),
        };

        let resp = request.json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OcrError::from_status(status, text));
        }

        let raw = resp.text().await?;
        debug!(
            "CloudVision: raw response ({} bytes): {}",
            raw.len(),
            raw.chars().take(500).collect::<String>()
        );
        parse_response(&raw)
    }
}

fn parse_response(raw: &str) -> Result<OcrText, OcrError> {
    let parsed: AnnotateResponse =
        serde_json::from_str(raw).map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
    let Some(response) = parsed.responses.into_iter().next() else {
        return Ok(OcrText::default());
    };

    if let Some(err) = response.error.filter(|e| e.code != 0) {
        return Err(match err.code {
            RPC_PERMISSION_DENIED | RPC_UNAUTHENTICATED => OcrError::Auth(err.message),
            RPC_RESOURCE_EXHAUSTED => OcrError::Quota(err.message),
            _ => OcrError::Unavailable(format!("rpc code {}: {}", err.code, err.message)),
        });
    }

    let mut logos = response.logo_annotations;
    logos.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ok(OcrText {
        text: response
            .full_text_annotation
            .map(|a| a.text)
            .unwrap_or_default(),
        logos: logos.into_iter().map(|l| l.description).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_logos() {
        let raw = r#"{"responses": [{
            "fullTextAnnotation": {"text": "Certificate of Completion\nJane Doe"},
            "logoAnnotations": [
                {"description": "Coursera", "score": 0.4},
                {"description": "Stanford University", "score": 0.9}
            ]
        }]}"#;
        let text = parse_response(raw).unwrap();
        assert!(text.text.starts_with("Certificate of Completion"));
        assert_eq!(text.logos, vec!["Stanford University", "Coursera"]);
    }

    #[test]
    fn test_no_text_is_not_an_error() {
        let text = parse_response(r#"{"responses": [{}]}"#).unwrap();
        assert!(text.text.is_empty());
        let text = parse_response(r#"{"responses": []}"#).unwrap();
        assert!(text.text.is_empty());
    }

    #[test]
    fn test_rpc_errors_are_distinct() {
        let quota = parse_response(
            r#"{"responses": [{"error": {"code": 8, "message": "quota"}}]}"#,
        );
        assert!(matches!(quota, Err(OcrError::Quota(_))));

        let auth = parse_response(
            r#"{"responses": [{"error": {"code": 16, "message": "no creds"}}]}"#,
        );
        assert!(matches!(auth, Err(OcrError::Auth(_))));

        let other = parse_response(r#"{"responses": [{"error": {"code": 3, "message": "bad"}}]}"#);
        assert!(matches!(other, Err(OcrError::Unavailable(_))));
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            parse_response("<html>"),
            Err(OcrError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_pdf_passthrough() {
        let backend = CloudVisionBackend::new(
            GoogleAuth::ApiKey("unused".to_string()),
            reqwest::Client::new(),
        );
        let pdf = PreparedImage {
            data: b"%PDF".to_vec(),
            mime_type: "application/pdf".to_string(),
            width: 0,
            height: 0,
        };
        assert!(backend.extract(&pdf).await.is_err());
    }
}
