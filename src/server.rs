//! HTTP server.
//!
//! A thin JSON layer over [`Pipeline`]: every handler parses the request,
//! calls exactly one pipeline operation, and maps the outcome to a response.
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/chat` | `{question, session_id?, model?}` | `{answer, session_id, model}` |
//! | `POST` | `/upload-doc` | multipart field `file`, or raw bytes with `?filename=<name>` | `{message, file_id}` |
//! | `GET`  | `/list-docs` | | `[{id, filename, upload_timestamp}]` |
//! | `POST` | `/delete-doc` | `{file_id}` | `{message}` |
//! | `GET`  | `/health` | | `{status, version}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "provider_unavailable", "message": "The openai provider is unavailable.", "retryable": true } }
//! ```
//!
//! Messages come from [`RagError::public_message`]; provider bodies and
//! storage errors are only logged. `file_id` is present when the error
//! concerns a known document.
//!
//! | Status | Codes |
//! |--------|-------|
//! | 400 | `unsupported_format`, `invalid_model`, `invalid_request`, `extraction_failed` |
//! | 404 | `not_found` |
//! | 502 | `embedding_failed`, `provider_unavailable` |
//! | 500 | `index_corruption`, `partial_failure`, `metadata_store`, `config` |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{
        rejection::JsonRejection, DefaultBodyLimit, FromRequest, Multipart, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{ErrorKind, RagError};
use crate::models::{AnswerRequest, AnswerResponse, DeleteOutcome, DocumentInfo};
use crate::pipeline::Pipeline;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Multipart field holding the uploaded document.
const UPLOAD_FIELD: &str = "file";

/// Open the pipeline described by `config` and serve until Ctrl-C or
/// SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::open(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "RAG server listening");
    serve(listener, pipeline, shutdown_signal()).await
}

/// Serve `pipeline` on `listener` until `shutdown` resolves, then drain
/// in-flight requests and close the pipeline.
pub async fn serve<F>(listener: TcpListener, pipeline: Arc<Pipeline>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let served = axum::serve(listener, router(pipeline.clone()))
        .with_graceful_shutdown(shutdown)
        .await;

    tracing::info!("closing pipeline");
    pipeline.close().await?;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Build the application router around a shared pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route(
            "/upload-doc",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/list-docs", get(handle_list_docs))
        .route("/delete-doc", post(handle_delete))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(pipeline)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g. `"unsupported_format"`).
    code: String,
    message: String,
    /// Whether the same request may succeed later.
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<i64>,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    retryable: bool,
    file_id: Option<i64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                retryable: self.retryable,
                file_id: self.file_id,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UnsupportedFormat
        | ErrorKind::InvalidModel
        | ErrorKind::InvalidRequest
        | ErrorKind::ExtractionFailed => StatusCode::BAD_REQUEST,
        ErrorKind::EmbeddingFailed | ErrorKind::ProviderUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::IndexCorruption
        | ErrorKind::PartialFailure
        | ErrorKind::MetadataStore
        | ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = status_for(err.kind());
        if status.is_client_error() {
            tracing::debug!(code = %err.kind(), error = %err, "request rejected");
        } else {
            tracing::error!(code = %err.kind(), retryable = err.is_retryable(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.kind().as_str().to_string(),
            message: err.public_message(),
            retryable: err.is_retryable(),
            file_id: err.file_id(),
        }
    }
}

fn invalid_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: ErrorKind::InvalidRequest.as_str().to_string(),
        message: message.into(),
        retryable: false,
        file_id: None,
    }
}

fn not_found(file_id: i64) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: format!("Document with file_id {} not found.", file_id),
        retryable: false,
        file_id: Some(file_id),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        invalid_request(rejection.body_text())
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

// ============ POST /chat ============

async fn handle_chat(
    State(pipeline): State<Arc<Pipeline>>,
    body: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(request) = body?;
    Ok(Json(pipeline.answer(request).await?))
}

// ============ POST /upload-doc ============

#[derive(Deserialize)]
struct UploadParams {
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    file_id: i64,
}

async fn handle_upload(
    State(pipeline): State<Arc<Pipeline>>,
    Query(params): Query<UploadParams>,
    request: Request,
) -> Result<Json<UploadResponse>, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (filename, bytes) = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| invalid_request(e.body_text()))?;
        read_upload_field(multipart).await?
    } else {
        let filename = params
            .filename
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| invalid_request("filename query parameter is required"))?;
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| invalid_request(e.body_text()))?;
        (filename, body.to_vec())
    };

    let report = pipeline.ingest_bytes(&filename, bytes).await?;
    Ok(Json(UploadResponse {
        message: format!(
            "File {} has been successfully uploaded and indexed.",
            report.filename
        ),
        file_id: report.file_id,
    }))
}

/// Filename and contents of the `file` form field.
async fn read_upload_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid_request(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .filter(|f| !f.trim().is_empty())
            .map(|f| f.to_string())
            .ok_or_else(|| invalid_request("the file field has no filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| invalid_request(e.body_text()))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(invalid_request("multipart form has no file field"))
}

// ============ GET /list-docs ============

async fn handle_list_docs(
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<Vec<DocumentInfo>>, AppError> {
    Ok(Json(pipeline.list_documents().await?))
}

// ============ POST /delete-doc ============

#[derive(Deserialize)]
struct DeleteRequest {
    file_id: i64,
}

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

async fn handle_delete(
    State(pipeline): State<Arc<Pipeline>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Json(request) = body?;
    match pipeline.delete(request.file_id).await? {
        DeleteOutcome::Deleted { file_id, .. } => Ok(Json(DeleteResponse {
            message: format!(
                "Successfully deleted document with file_id {} from the system.",
                file_id
            ),
        })),
        DeleteOutcome::NotFound { file_id, .. } => Err(not_found(file_id)),
    }
}
