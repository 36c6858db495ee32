//! Credential Extractor - HTTP shell over the document pipeline.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use credential_extractor::config::PipelineConfig;
use credential_extractor::preprocess::PDF_MIME;
use credential_extractor::schema::{
    DocumentTypeInfo, ExtractionResult, NormalizedFields, RawFieldMap,
};
use credential_extractor::{DocumentPipeline, PipelineError};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<DocumentPipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "credential_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;
    let pipeline = DocumentPipeline::from_config(&config)?;
    info!("Document pipeline initialized");

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/process", post(process_document))
        .route("/normalize", post(normalize_fields))
        .route("/classify", post(classify_text))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // 25MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Upload a credential and run the extraction cascade over it.
async fn process_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ExtractionResult>, (StatusCode, String)> {
    let mut filename = String::new();
    let mut content_type = None;
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document").to_string();
            content_type = field.content_type().map(str::to_string);
            file_data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?.to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    let mime_type = resolve_mime(&filename, content_type.as_deref());
    info!("Received file: {} ({} bytes, {})", filename, file_data.len(), mime_type);

    let result = state
        .pipeline
        .process_document(&file_data, &mime_type)
        .await
        .map_err(|e| match e {
            PipelineError::UnprocessableDocument(msg) => {
                error!("Rejected {}: {}", filename, msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
        })?;

    info!(
        "Extraction complete: {} via {} (confidence {:.2})",
        filename, result.extraction_method, result.confidence_score
    );
    Ok(Json(result))
}

/// Normalize an already-extracted field map.
async fn normalize_fields(
    State(state): State<AppState>,
    Json(fields): Json<RawFieldMap>,
) -> Json<NormalizedFields> {
    Json(state.pipeline.normalize(&fields))
}

#[derive(serde::Deserialize)]
struct ClassifyRequest {
    text: String,
}

/// Classify recognised text without running OCR.
async fn classify_text(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Json<DocumentTypeInfo> {
    Json(state.pipeline.classify(&request.text))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Declared content type, falling back to the file extension.
fn resolve_mime(filename: &str, declared: Option<&str>) -> String {
    match declared {
        Some(mime) if mime != "application/octet-stream" => mime.to_string(),
        _ => {
            let lower = filename.to_lowercase();
            if lower.ends_with(".pdf") {
                PDF_MIME.to_string()
            } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
                "image/jpeg".to_string()
            } else {
                "image/png".to_string()
            }
        }
    }
}
