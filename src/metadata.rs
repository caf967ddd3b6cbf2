//! Document metadata and chat history.
//!
//! [`MetadataStore`] is the pipeline's view of the relational side of the
//! service: one row per uploaded document (`document_store`) and one row
//! per answered question (`application_logs`). [`SqliteMetadataStore`]
//! backs it with the same SQLite file as the vector index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{ChatTurn, DocumentInfo};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record a new upload and return its id.
    async fn insert_document(&self, filename: &str) -> Result<i64>;

    /// Remove a document record. `false` if no record had this id.
    async fn delete_document(&self, id: i64) -> Result<bool>;

    /// All documents, most recent upload first.
    async fn list_documents(&self) -> Result<Vec<DocumentInfo>>;

    async fn append_log(&self, turn: &ChatTurn) -> Result<()>;

    /// Every turn of `session_id`, oldest first.
    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatTurn>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

fn store_err(e: sqlx::Error) -> RagError {
    RagError::MetadataStore(e.to_string())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RagError::MetadataStore(format!("timestamp out of range: {}", ms)))
}

impl SqliteMetadataStore {
    /// Wrap an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path)
            .await
            .map_err(|e| RagError::MetadataStore(format!("{:#}", e)))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| RagError::MetadataStore(format!("{:#}", e)))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_document(&self, filename: &str) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO document_store (filename, upload_timestamp) VALUES (?, ?)")
                .bind(filename)
                .bind(Utc::now().timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(result.last_insert_rowid())
    }

    async fn delete_document(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document_store WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let rows = sqlx::query(
            "SELECT id, filename, upload_timestamp FROM document_store \
             ORDER BY upload_timestamp DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| -> Result<DocumentInfo> {
                Ok(DocumentInfo {
                    id: row.try_get("id").map_err(store_err)?,
                    filename: row.try_get("filename").map_err(store_err)?,
                    upload_timestamp: from_millis(
                        row.try_get("upload_timestamp").map_err(store_err)?,
                    )?,
                })
            })
            .collect()
    }

    async fn append_log(&self, turn: &ChatTurn) -> Result<()> {
        sqlx::query(
            "INSERT INTO application_logs (session_id, user_query, gpt_response, model, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.session_id)
        .bind(&turn.user_message)
        .bind(&turn.ai_message)
        .bind(&turn.model_name)
        .bind(turn.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query(
            "SELECT session_id, user_query, gpt_response, model, created_at \
             FROM application_logs WHERE session_id = ? ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| -> Result<ChatTurn> {
                Ok(ChatTurn {
                    session_id: row.try_get("session_id").map_err(store_err)?,
                    user_message: row.try_get("user_query").map_err(store_err)?,
                    ai_message: row.try_get("gpt_response").map_err(store_err)?,
                    model_name: row.try_get("model").map_err(store_err)?,
                    timestamp: from_millis(row.try_get("created_at").map_err(store_err)?)?,
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
