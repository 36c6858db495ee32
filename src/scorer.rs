//! Confidence scoring policy for structured extraction output.

use crate::schema::{fields, DocumentType, ExtractionMethod, ExtractionResult, RawFieldMap};

/// Results scoring below this are flagged for human review.
pub const REVIEW_THRESHOLD: f64 = 0.7;

/// Turns structured fields into a scored [`ExtractionResult`].
///
/// Implementations own the acceptance policy for the native-text stage via
/// [`Scorer::is_high_confidence`]. Scores must stay within [0, 1].
pub trait Scorer: Send + Sync {
    fn score_result(
        &self,
        fields: &RawFieldMap,
        method: ExtractionMethod,
        document_type: DocumentType,
    ) -> ExtractionResult;

    fn is_high_confidence(&self, result: &ExtractionResult) -> bool;
}

/// Weighted field completeness scaled by how reliable the producing stage is.
#[derive(Debug, Clone, Default)]
pub struct CompletenessScorer;

const FIELD_WEIGHTS: &[(&str, f64)] = &[
    (fields::TITLE, 0.25),
    (fields::INSTITUTION, 0.2),
    (fields::RECIPIENT, 0.25),
    (fields::DATE_ISSUED, 0.15),
    (fields::CERTIFICATE_ID, 0.15),
];

const HIGH_CONFIDENCE: f64 = 0.8;

impl CompletenessScorer {
    fn reliability(method: ExtractionMethod) -> f64 {
        match method {
            ExtractionMethod::NativeText => 1.0,
            ExtractionMethod::CloudVision => 0.95,
            ExtractionMethod::SelfHostedOcr => 0.85,
            ExtractionMethod::LocalOcrFallback => 0.75,
        }
    }
}

impl Scorer for CompletenessScorer {
    fn score_result(
        &self,
        fields: &RawFieldMap,
        method: ExtractionMethod,
        document_type: DocumentType,
    ) -> ExtractionResult {
        let completeness: f64 = FIELD_WEIGHTS
            .iter()
            .filter(|(key, _)| fields.get(*key).map_or(false, |v| !v.trim().is_empty()))
            .map(|(_, weight)| weight)
            .sum();
        let confidence = ((completeness * Self::reliability(method)) * 100.0).round() / 100.0;

        build_result(fields, method, document_type, confidence.clamp(0.0, 1.0))
    }

    fn is_high_confidence(&self, result: &ExtractionResult) -> bool {
        result.confidence_score >= HIGH_CONFIDENCE
            && !result.title.is_empty()
            && !result.recipient.is_empty()
    }
}

/// Assemble a result from a field map and an already-computed score.
pub fn build_result(
    fields: &RawFieldMap,
    method: ExtractionMethod,
    document_type: DocumentType,
    confidence: f64,
) -> ExtractionResult {
    let get = |key: &str| fields.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    let optional = |key: &str| Some(get(key)).filter(|v| !v.is_empty());

    ExtractionResult {
        title: get(fields::TITLE),
        institution: get(fields::INSTITUTION),
        recipient: get(fields::RECIPIENT),
        date_issued: get(fields::DATE_ISSUED),
        certificate_id: optional(fields::CERTIFICATE_ID),
        gpa: optional(fields::GPA),
        confidence_score: confidence,
        extraction_method: method,
        requires_review: confidence < REVIEW_THRESHOLD,
        document_type,
    }
}
