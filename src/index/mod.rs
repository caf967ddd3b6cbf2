//! Vector index: chunk embeddings plus the chunk text and metadata needed
//! to hand them back to the retriever.
//!
//! Two backends implement [`VectorIndex`]:
//!
//! | Backend | Storage | Use |
//! |---------|---------|-----|
//! | [`SqliteVectorIndex`] | `chunk_vectors` table, WAL SQLite file | the service |
//! | [`InMemoryIndex`] | `RwLock<Vec<_>>` | tests, embedded callers |
//!
//! Both embed through an injected [`Embedder`] and share the batching,
//! validation, and ranking helpers in this module, so they order results
//! identically: cosine similarity descending, ties in insertion order.

mod memory;
mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteVectorIndex;

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store `chunks`. All or nothing: if any embedding call
    /// fails, nothing is written and [`RagError::EmbeddingFailed`] is returned.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// The `k` chunks most similar to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove every record of `document_id`. Returns how many were removed.
    async fn delete_by_document(&self, document_id: i64) -> Result<u64>;

    async fn count(&self) -> Result<u64>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Embed every chunk text, `batch_size` texts per provider call.
pub(crate) async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .map_err(|e| RagError::EmbeddingFailed(e.to_string()))?;
        if embedded.len() != texts.len() {
            return Err(RagError::EmbeddingFailed(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            )));
        }
        for vector in &embedded {
            check_dims(embedder, vector).map_err(RagError::EmbeddingFailed)?;
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Embed a search query. Provider failures keep their own error kind.
pub(crate) async fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    let vector = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::provider(embedder.model_name(), "empty embedding response", false))?;
    check_dims(embedder, &vector)
        .map_err(|message| RagError::provider(embedder.model_name(), message, false))?;
    Ok(vector)
}

fn check_dims(embedder: &dyn Embedder, vector: &[f32]) -> std::result::Result<(), String> {
    if vector.len() != embedder.dims() {
        return Err(format!(
            "dimension mismatch: {} declares {} dims, got {}",
            embedder.model_name(),
            embedder.dims(),
            vector.len()
        ));
    }
    Ok(())
}

/// Sort best first and keep `k`. The sort is stable, so candidates given
/// in insertion order keep that order among equal scores.
pub(crate) fn rank(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(k);
    candidates
}
