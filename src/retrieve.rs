//! Top-K chunk retrieval for a standalone question.

use std::sync::Arc;

use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{Chunk, ScoredChunk};

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` most similar chunks, best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(question)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve), keeping the similarity scores.
    pub async fn retrieve_scored(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.index.search(question, self.top_k).await
    }
}
