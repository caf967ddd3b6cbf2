//! Shared fixtures for the integration suites: documents, config, a
//! metadata store with injectable failures, and pipeline setup over the
//! library's deterministic providers.

#![allow(dead_code)]

use async_trait::async_trait;
use rag_harness::config::Config;
use rag_harness::error::{RagError, Result};
use rag_harness::metadata::{MetadataStore, SqliteMetadataStore};
use rag_harness::models::{ChatTurn, DocumentInfo};
use rag_harness::pipeline::Pipeline;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use rag_harness::test_support::{KeywordEmbedder, ScriptedChat};

pub const FRANCE_HTML: &str = "<html><head><title>France</title></head><body>\
<h1>France</h1><p>Paris is the capital of France. The Seine river flows through Paris.</p>\
</body></html>";

pub const RUST_HTML: &str = "<html><body><h1>Rust ownership</h1>\
<p>Each value in Rust has a single owner. The borrow checker enforces ownership rules at compile time.</p>\
</body></html>";

// ─── Metadata store with injectable failures ────────────────────────

pub struct FlakyMetadata {
    inner: SqliteMetadataStore,
    pub fail_deletes: AtomicBool,
}

impl FlakyMetadata {
    pub async fn open(path: &Path) -> Self {
        Self {
            inner: SqliteMetadataStore::open(path).await.unwrap(),
            fail_deletes: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MetadataStore for FlakyMetadata {
    async fn insert_document(&self, filename: &str) -> Result<i64> {
        self.inner.insert_document(filename).await
    }
    async fn delete_document(&self, id: i64) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RagError::MetadataStore("database is locked".to_string()));
        }
        self.inner.delete_document(id).await
    }
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        self.inner.list_documents().await
    }
    async fn append_log(&self, turn: &ChatTurn) -> Result<()> {
        self.inner.append_log(turn).await
    }
    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        self.inner.get_history(session_id).await
    }
}

// ─── Pipeline setup ─────────────────────────────────────────────────

pub fn test_config(root: &Path, top_k: usize) -> Config {
    let src = format!(
        r#"[db]
path = "{}/data/rag.sqlite"

[retrieval]
top_k = {}
"#,
        root.display(),
        top_k
    );
    toml::from_str(&src).unwrap()
}

pub async fn open_pipeline(
    config: &Config,
    embedder: Arc<KeywordEmbedder>,
    llm: Arc<ScriptedChat>,
) -> Pipeline {
    Pipeline::open_with(config, embedder, llm).await.unwrap()
}
