//! Credential Extractor - document intelligence for academic and
//! professional credentials.
//!
//! Classifies a credential, extracts its fields through a cost-ordered OCR
//! cascade, and normalizes the result into canonical values.

pub mod cascade;
pub mod classifier;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod ocr;
pub mod openrouter;
pub mod pdf;
pub mod pipeline;
pub mod preprocess;
pub mod schema;
pub mod scorer;
pub mod structurer;

pub use error::{OcrError, PipelineError};
pub use pipeline::DocumentPipeline;
