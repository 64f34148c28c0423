//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `GET`  | `/health` | — | `{ "status": "ok", "version": ... }` |
//! | `POST` | `/api/ingest` | multipart `file`, `base64Data`, `fileType` | `{ "data": "success" }` |
//! | `POST` | `/api/query` | `{ "prompt": ... }` | `{ "data": AnalysisResult }` |
//! | `POST` | `/api/analyze` | multipart as ingest, plus `customPrompt` | `{ "data": AnalysisResult }` |
//!
//! `base64Data` takes precedence over the raw `file` bytes. `fileType`
//! falls back to the content type of the `file` part.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "extraction_failed", "message": "..." } }
//! ```
//!
//! `bad_request` is 400 and every upstream stage failure
//! (`extraction_failed`, `embedding_failed`, `persistence_failed`,
//! `search_failed`, `generation_failed`) is 502.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use doco_core::{AnalysisResult, Document, Pipeline, PipelineError};

use crate::app::build_pipeline;
use crate::config::Config;

/// Upper bound on request bodies; uploads are whole documents.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(build_pipeline(config).await?);

    if config.store.purge_interval_secs > 0 {
        spawn_purge_task(
            pipeline.clone(),
            Duration::from_secs(config.store.purge_interval_secs),
        );
    }

    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "doco server listening");
    println!("Doco server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Routes with CORS, tracing and the upload size limit applied.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/query", post(handle_query))
        .route("/api/analyze", post(handle_analyze))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// Delete expired chunks on a fixed interval. Search filters expired rows
/// on its own; this only reclaims space.
fn spawn_purge_task(pipeline: Arc<Pipeline>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match pipeline.store().purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!(removed = n, "purged expired chunks"),
                Err(e) => warn!(error = %e, "purge failed"),
            }
        }
    });
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Uploads ============

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

/// Fields of an upload form.
#[derive(Default)]
struct Upload {
    file_bytes: Option<Vec<u8>>,
    file_name: Option<String>,
    file_content_type: Option<String>,
    base64_data: Option<String>,
    file_type: Option<String>,
    custom_prompt: Option<String>,
}

impl Upload {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut upload = Upload::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    upload.file_name = field.file_name().map(str::to_string);
                    upload.file_content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("failed to read file: {}", e)))?;
                    upload.file_bytes = Some(bytes.to_vec());
                }
                "base64Data" | "fileType" | "customPrompt" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("failed to read {}: {}", name, e)))?;
                    match name.as_str() {
                        "base64Data" => upload.base64_data = Some(text),
                        "fileType" => upload.file_type = Some(text),
                        _ => upload.custom_prompt = Some(text),
                    }
                }
                _ => {}
            }
        }
        Ok(upload)
    }

    fn into_document(self) -> Result<(Document, Option<String>), AppError> {
        let bytes = match (self.base64_data, self.file_bytes) {
            (Some(b64), _) if !b64.trim().is_empty() => decode_base64(&b64)?,
            (_, Some(bytes)) => bytes,
            _ => return Err(bad_request("a file or base64Data field is required")),
        };
        if bytes.is_empty() {
            return Err(bad_request("uploaded file is empty"));
        }

        let media_type = self
            .file_type
            .filter(|t| !t.trim().is_empty())
            .or(self.file_content_type)
            .ok_or_else(|| bad_request("fileType is required"))?;

        let mut document = Document::new(bytes, media_type);
        if let Some(name) = self.file_name {
            document = document.with_name(name);
        }
        Ok((document, self.custom_prompt))
    }
}

/// Decode standard base64, tolerating a `data:<type>;base64,` prefix.
fn decode_base64(raw: &str) -> Result<Vec<u8>, AppError> {
    let payload = match raw.find("base64,") {
        Some(pos) if raw.starts_with("data:") => &raw[pos + "base64,".len()..],
        _ => raw,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| bad_request(format!("base64Data is not valid base64: {}", e)))
}

// ============ POST /api/ingest ============

async fn handle_ingest(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DataResponse<&'static str>>, AppError> {
    let (document, _) = Upload::read(multipart).await?.into_document()?;
    let report = state.pipeline.ingest(&document).await?;
    info!(chunks = report.chunks, digest = %report.digest, "ingested upload");
    Ok(Json(DataResponse { data: "success" }))
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    prompt: String,
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<DataResponse<AnalysisResult>>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let result = state.pipeline.answer(&request.prompt).await?;
    Ok(Json(DataResponse { data: result }))
}

// ============ POST /api/analyze ============

async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DataResponse<AnalysisResult>>, AppError> {
    let (document, custom_prompt) = Upload::read(multipart).await?.into_document()?;
    let result = state
        .pipeline
        .summarize(&document, custom_prompt.as_deref())
        .await?;
    Ok(Json(DataResponse { data: result }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64("aGk=").unwrap(), b"hi");
        assert_eq!(decode_base64("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert!(decode_base64("***").is_err());
    }

    #[test]
    fn test_upload_precedence() {
        let upload = Upload {
            file_bytes: Some(b"raw".to_vec()),
            file_content_type: Some("text/plain".into()),
            base64_data: Some("aGk=".into()),
            file_type: Some("application/pdf".into()),
            ..Default::default()
        };
        let (doc, _) = upload.into_document().ok().unwrap();
        assert_eq!(doc.bytes, b"hi");
        assert_eq!(doc.media_type, "application/pdf");
    }

    #[test]
    fn test_upload_falls_back_to_part_content_type() {
        let upload = Upload {
            file_bytes: Some(b"raw".to_vec()),
            file_content_type: Some("text/plain".into()),
            file_name: Some("notes.txt".into()),
            ..Default::default()
        };
        let (doc, _) = upload.into_document().ok().unwrap();
        assert_eq!(doc.media_type, "text/plain");
        assert_eq!(doc.name.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn test_upload_requires_content() {
        assert!(Upload::default().into_document().is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let err: AppError = PipelineError::InvalidArgument("empty".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err: AppError = PipelineError::Embedding(anyhow::anyhow!("down")).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "embedding_failed");
    }
}
