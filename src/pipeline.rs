//! The answering pipeline and its ingestion/deletion flows.
//!
//! [`Pipeline`] composes the stages of a question:
//!
//! ```text
//! question ─▶ Contextualizer ─▶ Retriever ─▶ Synthesizer ─▶ log ─▶ answer
//!               (history)       (index)      (history + original question)
//! ```
//!
//! and owns the document lifecycle:
//!
//! ```text
//! upload ─▶ metadata record ─▶ extract ─▶ chunk ─▶ embed + index
//!                 ▲                                     │
//!                 └──────── removed again on failure ◀──┘
//! delete ─▶ index records ─▶ metadata record
//! ```
//!
//! Each request runs its stages strictly in order and never retries. The
//! only shared state is the vector index and the metadata store.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::contextualize::Contextualizer;
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::extract::{extract_text, DocumentFormat};
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};
use crate::metadata::{MetadataStore, SqliteMetadataStore};
use crate::migrate;
use crate::models::{
    history_messages, AnswerRequest, AnswerResponse, ChatTurn, DeleteOutcome, DocumentInfo,
    IngestReport, ModelName, ScoredChunk,
};
use crate::retrieve::Retriever;
use crate::synthesize::Synthesizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStage {
    Received,
    Contextualizing,
    Retrieving,
    Synthesizing,
    Logged,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    PersistedMetadata,
    Chunked,
    Embedded,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStage {
    Received,
    VectorDeleted,
    MetadataDeleted,
    Done,
}

/// Tunables that are not collaborators.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub splitter: TextSplitter,
    pub top_k: usize,
    pub default_model: ModelName,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            splitter: TextSplitter::default(),
            top_k: 2,
            default_model: ModelName::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            splitter: TextSplitter::from_config(&config.chunking)?,
            top_k: config.retrieval.top_k,
            default_model: config.llm.default_model,
        })
    }
}

pub struct Pipeline {
    splitter: TextSplitter,
    index: Arc<dyn VectorIndex>,
    metadata: Arc<dyn MetadataStore>,
    contextualizer: Contextualizer,
    retriever: Retriever,
    synthesizer: Synthesizer,
    default_model: ModelName,
}

impl Pipeline {
    /// Assemble a pipeline from already constructed collaborators.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        metadata: Arc<dyn MetadataStore>,
        llm: Arc<dyn ChatModel>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            splitter: options.splitter,
            contextualizer: Contextualizer::new(llm.clone()),
            retriever: Retriever::new(index.clone(), options.top_k),
            synthesizer: Synthesizer::new(llm),
            index,
            metadata,
            default_model: options.default_model,
        }
    }

    /// Connect to the configured database and build every provider from
    /// the config.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_chat_model(&config.llm)?;
        Self::open_with(config, embedder, llm).await
    }

    /// Like [`open`](Self::open) with caller-supplied providers.
    pub async fn open_with(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let options = PipelineOptions::from_config(config)?;
        let pool = db::connect(config)
            .await
            .map_err(|e| RagError::MetadataStore(format!("{:#}", e)))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| RagError::MetadataStore(format!("{:#}", e)))?;

        let index = Arc::new(SqliteVectorIndex::new(
            pool.clone(),
            embedder,
            config.embedding.batch_size,
        ));
        let metadata = Arc::new(SqliteMetadataStore::new(pool));
        Ok(Self::new(index, metadata, llm, options))
    }

    pub fn default_model(&self) -> ModelName {
        self.default_model
    }

    /// Answer one question within a chat session.
    ///
    /// A missing session id starts a new session. The model identifier is
    /// validated before anything else happens.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerResponse> {
        let model = match request.model.as_deref() {
            Some(name) => name.parse::<ModelName>()?,
            None => self.default_model,
        };
        if request.question.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        let session_id = request
            .session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let question = request.question;
        tracing::info!(session_id = %session_id, model = %model, stage = ?AnswerStage::Received, "question received");

        let turns = self.metadata.get_history(&session_id).await?;
        let history = history_messages(&turns);

        tracing::debug!(session_id = %session_id, stage = ?AnswerStage::Contextualizing, turns = turns.len());
        let standalone = self
            .contextualizer
            .contextualize(&question, &history, model)
            .await?;

        tracing::debug!(session_id = %session_id, stage = ?AnswerStage::Retrieving, standalone = %standalone);
        let chunks = self.retriever.retrieve(&standalone).await?;

        tracing::debug!(session_id = %session_id, stage = ?AnswerStage::Synthesizing, chunks = chunks.len());
        let answer = self
            .synthesizer
            .synthesize(&question, &chunks, &history, model)
            .await?;

        self.metadata
            .append_log(&ChatTurn {
                session_id: session_id.clone(),
                user_message: question,
                ai_message: answer.clone(),
                model_name: model.as_str().to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        tracing::debug!(session_id = %session_id, stage = ?AnswerStage::Logged);

        tracing::info!(session_id = %session_id, stage = ?AnswerStage::Done, "question answered");
        Ok(AnswerResponse {
            answer,
            session_id,
            model,
        })
    }

    /// Retrieve scored chunks for `query` without calling a language model.
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.retriever.retrieve_scored(query).await
    }

    /// Ingest the file at `path`; the declared extension is the path's.
    pub async fn ingest(&self, path: &Path) -> Result<IngestReport> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RagError::InvalidRequest(format!("not a file path: {}", path.display()))
            })?
            .to_string();
        // Reject unsupported types before touching the file.
        DocumentFormat::from_filename(&filename)?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::extraction(&filename, format!("cannot read file: {}", e)))?;
        self.ingest_bytes(&filename, bytes).await
    }

    /// Ingest an uploaded document body.
    ///
    /// On any failure after the metadata record is written, the record is
    /// removed again before the error is returned.
    pub async fn ingest_bytes(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        let format = DocumentFormat::from_filename(filename)?;
        tracing::info!(filename, bytes = bytes.len(), stage = ?IngestStage::Received, "document received");

        let file_id = self.metadata.insert_document(filename).await?;
        tracing::debug!(file_id, stage = ?IngestStage::PersistedMetadata);

        match self.index_document(file_id, filename, format, bytes).await {
            Ok(chunks) => {
                tracing::info!(file_id, filename, chunks, stage = ?IngestStage::Done, "document indexed");
                Ok(IngestReport {
                    file_id,
                    filename: filename.to_string(),
                    chunks,
                })
            }
            Err(err) => {
                tracing::warn!(file_id, filename, error = %err, "ingestion failed, removing metadata record");
                if let Err(cleanup) = self.metadata.delete_document(file_id).await {
                    tracing::error!(file_id, error = %cleanup, "failed to remove metadata record after ingestion failure");
                }
                Err(err)
            }
        }
    }

    async fn index_document(
        &self,
        file_id: i64,
        filename: &str,
        format: DocumentFormat,
        bytes: Vec<u8>,
    ) -> Result<usize> {
        let owned_name = filename.to_string();
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, format, &owned_name))
            .await
            .map_err(|e| RagError::extraction(filename, format!("extraction task failed: {}", e)))??;
        if text.trim().is_empty() {
            return Err(RagError::extraction(filename, "no extractable text"));
        }

        let chunks = self.splitter.split_document(&text, file_id, filename);
        tracing::debug!(file_id, chunks = chunks.len(), stage = ?IngestStage::Chunked);

        let added = self.index.add(&chunks).await?;
        tracing::debug!(file_id, stage = ?IngestStage::Embedded);
        Ok(added)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        self.metadata.list_documents().await
    }

    /// Remove a document's chunks, then its metadata record.
    ///
    /// If the index step fails nothing else is attempted. If the index step
    /// succeeds but the metadata step fails, the chunks stay deleted and
    /// [`RagError::PartialFailure`] is returned.
    pub async fn delete(&self, file_id: i64) -> Result<DeleteOutcome> {
        tracing::info!(file_id, stage = ?DeleteStage::Received, "delete requested");

        let chunks_removed = self.index.delete_by_document(file_id).await?;
        tracing::debug!(file_id, chunks_removed, stage = ?DeleteStage::VectorDeleted);

        let existed = self
            .metadata
            .delete_document(file_id)
            .await
            .map_err(|e| {
                tracing::error!(file_id, chunks_removed, error = %e, "metadata delete failed after index delete");
                RagError::PartialFailure {
                    file_id,
                    chunks_removed,
                    detail: e.to_string(),
                }
            })?;
        tracing::debug!(file_id, existed, stage = ?DeleteStage::MetadataDeleted);

        tracing::info!(file_id, chunks_removed, stage = ?DeleteStage::Done, "delete finished");
        Ok(if existed {
            DeleteOutcome::Deleted {
                file_id,
                chunks_removed,
            }
        } else {
            DeleteOutcome::NotFound {
                file_id,
                chunks_removed,
            }
        })
    }

    /// Close the index and the metadata store.
    pub async fn close(&self) -> Result<()> {
        self.index.close().await?;
        self.metadata.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryIndex;
    use crate::test_support::{KeywordEmbedder, ScriptedChat};
    use tempfile::TempDir;

    async fn pipeline(dir: &TempDir, llm: Arc<ScriptedChat>) -> Pipeline {
        let metadata = SqliteMetadataStore::open(&dir.path().join("meta.sqlite"))
            .await
            .unwrap();
        let index = InMemoryIndex::new(Arc::new(KeywordEmbedder::new()), 16);
        Pipeline::new(
            Arc::new(index),
            Arc::new(metadata),
            llm,
            PipelineOptions::default(),
        )
    }

    #[tokio::test]
    async fn unknown_model_fails_before_any_call() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedChat::replying("x"));
        let p = pipeline(&dir, llm.clone()).await;
        let err = p
            .answer(AnswerRequest {
                question: "hi".to_string(),
                session_id: Some("s".to_string()),
                model: Some("gpt-2".to_string()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidModel(_)));
        assert!(llm.requests().is_empty());
        assert!(p.metadata.get_history("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(&dir, Arc::new(ScriptedChat::replying("x"))).await;
        let err = p
            .answer(AnswerRequest {
                question: "   ".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn answer_logs_turn_and_reuses_session() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedChat::replying("the answer"));
        let p = pipeline(&dir, llm.clone()).await;

        let first = p
            .answer(AnswerRequest {
                question: "first?".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.model, ModelName::Gpt4oMini);

        p.answer(AnswerRequest {
            question: "second?".to_string(),
            session_id: Some(first.session_id.clone()),
            model: Some("gpt-4o".to_string()),
        })
        .await
        .unwrap();

        let history = p.metadata.get_history(&first.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].model_name, "gpt-4o");

        // First answer: synthesis only. Second: contextualize + synthesize.
        assert_eq!(llm.requests().len(), 3);
    }

    #[tokio::test]
    async fn blank_document_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let p = pipeline(&dir, Arc::new(ScriptedChat::replying("x"))).await;
        let err = p
            .ingest_bytes("empty.html", b"<html><body>  </body></html>".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ExtractionFailed { .. }));
        assert!(p.list_documents().await.unwrap().is_empty());
    }
}
