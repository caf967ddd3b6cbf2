//! In-process [`VectorIndex`] with the same ranking as the SQLite backend.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::{embed_chunks, embed_query, rank, VectorIndex};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

struct Record {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Non-persistent index kept in process memory.
///
/// The lock is never held across an `.await`: embedding happens first,
/// then records are appended under a single write lock.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    records: RwLock<Vec<Record>>,
}

fn poisoned<T>(_: T) -> RagError {
    RagError::IndexCorruption("in-memory index lock poisoned".to_string())
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = embed_chunks(self.embedder.as_ref(), chunks, self.batch_size).await?;

        let mut records = self.records.write().map_err(poisoned)?;
        records.extend(
            chunks
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, embedding)| Record { chunk, embedding }),
        );
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let candidates = {
            let records = self.records.read().map_err(poisoned)?;
            records
                .iter()
                .filter(|r| r.embedding.len() == query_vec.len())
                .map(|r| ScoredChunk {
                    chunk: r.chunk.clone(),
                    score: cosine_similarity(&query_vec, &r.embedding),
                })
                .collect::<Vec<_>>()
        };
        Ok(rank(candidates, k))
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<u64> {
        let mut records = self.records.write().map_err(poisoned)?;
        let before = records.len();
        records.retain(|r| r.chunk.source_document_id != document_id);
        Ok((before - records.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().map_err(poisoned)?.len() as u64)
    }
}
