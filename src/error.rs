//! Typed errors for the answering pipeline.
//!
//! Every failure that crosses the [`Pipeline`](crate::pipeline::Pipeline)
//! boundary is a [`RagError`]. Callers branch on [`RagError::kind`], which
//! yields a stable, machine-checkable [`ErrorKind`]; the `Display` text is
//! meant for humans and never contains stack traces.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Unsupported file type: {extension}. Allowed types are: .pdf, .docx, .html")]
    UnsupportedFormat { extension: String },

    #[error("Failed to extract text from {filename}: {message}")]
    ExtractionFailed { filename: String, message: String },

    #[error("Failed to embed document chunks: {0}")]
    EmbeddingFailed(String),

    #[error("{provider} provider unavailable: {message}")]
    ProviderUnavailable {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("Invalid model: {0}. Allowed models are: gpt-4o, gpt-4o-mini, gpt-4.1-mini")]
    InvalidModel(String),

    #[error("Vector index failure: {0}")]
    IndexCorruption(String),

    #[error(
        "Deleted {chunks_removed} chunks of document {file_id} from the vector index \
         but failed to delete its metadata record: {detail}"
    )]
    PartialFailure {
        file_id: i64,
        chunks_removed: u64,
        detail: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Metadata store failure: {0}")]
    MetadataStore(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Machine-checkable classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    ExtractionFailed,
    EmbeddingFailed,
    ProviderUnavailable,
    InvalidModel,
    IndexCorruption,
    PartialFailure,
    InvalidRequest,
    MetadataStore,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::EmbeddingFailed => "embedding_failed",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::InvalidModel => "invalid_model",
            ErrorKind::IndexCorruption => "index_corruption",
            ErrorKind::PartialFailure => "partial_failure",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::MetadataStore => "metadata_store",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            RagError::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            RagError::EmbeddingFailed(_) => ErrorKind::EmbeddingFailed,
            RagError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            RagError::InvalidModel(_) => ErrorKind::InvalidModel,
            RagError::IndexCorruption(_) => ErrorKind::IndexCorruption,
            RagError::PartialFailure { .. } => ErrorKind::PartialFailure,
            RagError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RagError::MetadataStore(_) => ErrorKind::MetadataStore,
            RagError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether retrying the same call later may succeed.
    ///
    /// Only provider errors carry this information; the pipeline itself
    /// never retries, it just surfaces the flag to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::ProviderUnavailable {
                retryable: true,
                ..
            }
        )
    }

    /// Message safe to hand to a remote caller.
    ///
    /// Carries only what the caller sent or what this service decided,
    /// never provider response bodies or storage driver text. The full
    /// error belongs in the logs.
    pub fn public_message(&self) -> String {
        match self {
            RagError::UnsupportedFormat { .. } | RagError::InvalidModel(_) => self.to_string(),
            RagError::InvalidRequest(message) => format!("Invalid request: {}", message),
            RagError::ExtractionFailed { filename, .. } => {
                format!("Failed to extract text from {}.", filename)
            }
            RagError::EmbeddingFailed(_) => "Failed to embed document chunks.".to_string(),
            RagError::ProviderUnavailable { provider, .. } => {
                format!("The {} provider is unavailable.", provider)
            }
            RagError::IndexCorruption(_) => "The vector index failed.".to_string(),
            RagError::PartialFailure {
                file_id,
                chunks_removed,
                ..
            } => format!(
                "Deleted {} chunks of document {} but failed to delete its metadata record.",
                chunks_removed, file_id
            ),
            RagError::MetadataStore(_) => "The metadata store failed.".to_string(),
            RagError::Config(_) => "The service is misconfigured.".to_string(),
        }
    }

    /// The document an error refers to, when there is one.
    pub fn file_id(&self) -> Option<i64> {
        match self {
            RagError::PartialFailure { file_id, .. } => Some(*file_id),
            _ => None,
        }
    }

    pub(crate) fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        RagError::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
            retryable,
        }
    }

    pub(crate) fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        RagError::ExtractionFailed {
            filename: filename.into(),
            message: message.into(),
        }
    }
}

/// Classify a transport-level reqwest failure.
///
/// Timeouts and connection failures are transient; anything else (body
/// decoding, builder errors) will not improve on retry.
pub(crate) fn classify_reqwest(provider: &str, err: &reqwest::Error) -> RagError {
    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
    let message = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    };
    RagError::provider(provider, message, retryable)
}

/// Classify a non-success HTTP status returned by a provider.
///
/// 429 and 5xx are transient; every other status is a caller or
/// credential problem and will fail the same way again.
pub(crate) fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> RagError {
    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    RagError::provider(provider, format!("API error {}: {}", status, body), retryable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_snake_case() {
        let err = RagError::UnsupportedFormat {
            extension: ".txt".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
        assert_eq!(err.kind().as_str(), "unsupported_format");
        assert_eq!(
            serde_json::to_string(&ErrorKind::PartialFailure).unwrap(),
            "\"partial_failure\""
        );
    }

    #[test]
    fn only_transient_provider_errors_are_retryable() {
        assert!(RagError::provider("openai", "timed out", true).is_retryable());
        assert!(!RagError::provider("openai", "401", false).is_retryable());
        assert!(!RagError::EmbeddingFailed("boom".into()).is_retryable());
    }

    #[test]
    fn status_classification() {
        assert!(classify_status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status("openai", reqwest::StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!classify_status("openai", reqwest::StatusCode::UNAUTHORIZED, "").is_retryable());
    }

    #[test]
    fn public_message_drops_collaborator_text() {
        let upstream = classify_status(
            "openai",
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided: sk-proj-ABCD"}}"#,
        );
        assert!(upstream.to_string().contains("sk-proj"));
        assert_eq!(upstream.public_message(), "The openai provider is unavailable.");

        let storage = RagError::MetadataStore("error returned from database: disk I/O error".into());
        assert!(!storage.public_message().contains("disk I/O"));

        let partial = RagError::PartialFailure {
            file_id: 7,
            chunks_removed: 3,
            detail: "database is locked".to_string(),
        };
        assert!(!partial.public_message().contains("locked"));
        assert_eq!(partial.file_id(), Some(7));
    }

    #[test]
    fn display_has_no_debug_noise() {
        let err = RagError::InvalidModel("gpt-5".to_string());
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid model: gpt-5"));
        assert!(!msg.contains("InvalidModel"));
    }
}
