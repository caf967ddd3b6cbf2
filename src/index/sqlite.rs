//! SQLite-backed [`VectorIndex`].
//!
//! Each chunk is one `chunk_vectors` row holding the chunk text, its source
//! document, the embedding as a little-endian `f32` blob, and a SHA-256
//! fingerprint of the text (`hash`) for auditing what was embedded.
//! Search is a brute-force cosine scan over rows whose `dims` match the
//! query vector, in rowid order.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;

use super::{embed_chunks, embed_query, rank, VectorIndex};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Chunk, ScoredChunk};

/// Persistent vector index stored in the `chunk_vectors` table.
///
/// Every `add` and `delete_by_document` is one SQLite transaction and every
/// `search` is one `SELECT`, so under WAL a search sees either all or none
/// of a concurrent write.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

fn storage(e: sqlx::Error) -> RagError {
    RagError::IndexCorruption(e.to_string())
}

impl SqliteVectorIndex {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            pool,
            embedder,
            batch_size,
        }
    }

    /// Open (creating if needed) the index stored at `path`.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        let pool = db::connect_path(path)
            .await
            .map_err(|e| RagError::IndexCorruption(format!("{:#}", e)))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| RagError::IndexCorruption(format!("{:#}", e)))?;
        Ok(Self::new(pool, embedder, batch_size))
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        // Embed everything before touching the database.
        let vectors = embed_chunks(self.embedder.as_ref(), chunks, self.batch_size).await?;

        let model = self.embedder.model_name().to_string();
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            let hash = format!("{:x}", Sha256::digest(chunk.text.as_bytes()));
            sqlx::query(
                "INSERT INTO chunk_vectors \
                 (document_id, filename, chunk_index, start_index, text, hash, model, dims, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(chunk.source_document_id)
            .bind(&chunk.source_filename)
            .bind(chunk.chunk_index)
            .bind(chunk.start_index)
            .bind(&chunk.text)
            .bind(&hash)
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;

        tracing::debug!(chunks = chunks.len(), model = %model, "indexed chunks");
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            "SELECT document_id, filename, chunk_index, start_index, text, dims, embedding \
             FROM chunk_vectors WHERE dims = ? ORDER BY id",
        )
        .bind(query_vec.len() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let dims: i64 = row.try_get("dims").map_err(storage)?;
            let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;
            if blob.len() != dims as usize * 4 {
                return Err(RagError::IndexCorruption(format!(
                    "embedding blob of {} bytes does not hold {} dims",
                    blob.len(),
                    dims
                )));
            }
            let vector = blob_to_vec(&blob);
            candidates.push(ScoredChunk {
                chunk: Chunk {
                    text: row.try_get("text").map_err(storage)?,
                    source_document_id: row.try_get("document_id").map_err(storage)?,
                    source_filename: row.try_get("filename").map_err(storage)?,
                    chunk_index: row.try_get("chunk_index").map_err(storage)?,
                    start_index: row.try_get("start_index").map_err(storage)?,
                },
                score: cosine_similarity(&query_vec, &vector),
            });
        }

        Ok(rank(candidates, k))
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let result = sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(count as u64)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
