//! Core data models used throughout the answering pipeline.
//!
//! These types represent the documents, chunks, chat turns, and request /
//! response shapes that flow between the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RagError;

/// A bounded, overlapping segment of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub source_document_id: i64,
    pub source_filename: String,
    /// Position of this chunk within its document (0-based, contiguous).
    pub chunk_index: i64,
    /// Offset, in characters, of the chunk's first character in the
    /// extracted document text.
    pub start_index: i64,
}

/// A chunk together with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Metadata record for an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub id: i64,
    pub filename: String,
    pub upload_timestamp: DateTime<Utc>,
}

/// One question/answer exchange within a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_message: String,
    pub ai_message: String,
    pub model_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Message role in a chat-completion conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Flatten stored chat turns into an alternating user/assistant history,
/// oldest first.
pub fn history_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .flat_map(|turn| {
            [
                ChatMessage::user(turn.user_message.clone()),
                ChatMessage::assistant(turn.ai_message.clone()),
            ]
        })
        .collect()
}

/// The closed set of language models a caller may select per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelName {
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[default]
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4.1-mini")]
    Gpt41Mini,
}

impl ModelName {
    pub const ALL: [ModelName; 3] = [ModelName::Gpt4o, ModelName::Gpt4oMini, ModelName::Gpt41Mini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::Gpt4o => "gpt-4o",
            ModelName::Gpt4oMini => "gpt-4o-mini",
            ModelName::Gpt41Mini => "gpt-4.1-mini",
        }
    }
}

impl FromStr for ModelName {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RagError::InvalidModel(s.to_string()))
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question submitted to [`Pipeline::answer`](crate::pipeline::Pipeline::answer).
///
/// `model` is kept as the caller's raw identifier so that an unknown name
/// is rejected by the pipeline itself, before any provider is contacted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub session_id: String,
    pub model: ModelName,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub file_id: i64,
    pub filename: String,
    pub chunks: usize,
}

/// Result of a deletion that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The metadata record existed and was removed along with its chunks.
    Deleted { file_id: i64, chunks_removed: u64 },
    /// No metadata record had this id; any stray chunks were still purged.
    NotFound { file_id: i64, chunks_removed: u64 },
}
