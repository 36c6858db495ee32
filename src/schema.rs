//! Credential extraction data model.
//!
//! Every value here is produced and consumed within a single processing
//! request. Persistence is the caller's business.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unstructured field map, as produced by a structurer or posted by a caller.
pub type RawFieldMap = BTreeMap<String, String>;

/// Kinds of credential the classifier can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Certificate,
    Diploma,
    Transcript,
    Award,
    License,
    WorkshopCertificate,
    InternshipCertificate,
    ConferenceCertificate,
    ResearchCertificate,
    VolunteerCertificate,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Diploma => "diploma",
            Self::Transcript => "transcript",
            Self::Award => "award",
            Self::License => "license",
            Self::WorkshopCertificate => "workshop_certificate",
            Self::InternshipCertificate => "internship_certificate",
            Self::ConferenceCertificate => "conference_certificate",
            Self::ResearchCertificate => "research_certificate",
            Self::VolunteerCertificate => "volunteer_certificate",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeInfo {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub confidence: f64,
    /// Human-readable evidence, for audit only.
    pub characteristics: Vec<String>,
    /// Free-text instructions consumed by the field structurer.
    pub extraction_hints: Vec<String>,
}

/// Which cascade stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    NativeText,
    CloudVision,
    SelfHostedOcr,
    LocalOcrFallback,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeText => "native_text",
            Self::CloudVision => "cloud_vision",
            Self::SelfHostedOcr => "self_hosted_ocr",
            Self::LocalOcrFallback => "local_ocr_fallback",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output of one cascade stage. Never mutated after scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub date_issued: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    pub confidence_score: f64,
    pub extraction_method: ExtractionMethod,
    pub requires_review: bool,
    pub document_type: DocumentType,
}

impl ExtractionResult {
    /// Field map in the structurer's key vocabulary, ready for `normalize`.
    pub fn to_field_map(&self) -> RawFieldMap {
        let mut map = RawFieldMap::new();
        let pairs = [
            (fields::TITLE, Some(&self.title)),
            (fields::INSTITUTION, Some(&self.institution)),
            (fields::RECIPIENT, Some(&self.recipient)),
            (fields::DATE_ISSUED, Some(&self.date_issued)),
            (fields::CERTIFICATE_ID, self.certificate_id.as_ref()),
            (fields::GPA, self.gpa.as_ref()),
        ];
        for (key, value) in pairs {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                map.insert(key.to_string(), v.clone());
            }
        }
        map
    }
}

/// Keys a structurer writes into a [`RawFieldMap`].
pub mod fields {
    pub const TITLE: &str = "title";
    pub const INSTITUTION: &str = "institution";
    pub const RECIPIENT: &str = "recipient";
    pub const DATE_ISSUED: &str = "date_issued";
    pub const CERTIFICATE_ID: &str = "certificate_id";
    pub const GPA: &str = "gpa";
}

/// Canonicalised fields plus the multiplicative confidence across them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    /// ISO `YYYY-MM-DD` when parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Two-decimal string on a 0-4.00 scale when parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    pub confidence: f64,
    pub original_values: RawFieldMap,
    pub normalized_values: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_serialize_snake_case() {
        let json = serde_json::to_string(&ExtractionMethod::LocalOcrFallback).unwrap();
        assert_eq!(json, "\"local_ocr_fallback\"");
        let json = serde_json::to_string(&DocumentType::WorkshopCertificate).unwrap();
        assert_eq!(json, "\"workshop_certificate\"");
    }

    #[test]
    fn test_to_field_map_skips_empty() {
        let result = ExtractionResult {
            title: "Bachelor of Science".to_string(),
            institution: String::new(),
            recipient: "Jane Doe".to_string(),
            date_issued: String::new(),
            certificate_id: Some("AB-12".to_string()),
            gpa: None,
            confidence_score: 0.5,
            extraction_method: ExtractionMethod::CloudVision,
            requires_review: true,
            document_type: DocumentType::Diploma,
        };
        let map = result.to_field_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("recipient").map(String::as_str), Some("Jane Doe"));
        assert!(!map.contains_key("institution"));
    }

    #[test]
    fn test_normalized_fields_camel_case_keys() {
        let fields = NormalizedFields {
            name: None,
            institution: None,
            degree: None,
            date: None,
            gpa: None,
            id_number: Some("X1".to_string()),
            confidence: 0.8,
            original_values: RawFieldMap::new(),
            normalized_values: BTreeMap::new(),
        };
        let value = serde_json::to_value(&fields).unwrap();
        assert!(value.get("idNumber").is_some());
        assert!(value.get("originalValues").is_some());
    }
}
