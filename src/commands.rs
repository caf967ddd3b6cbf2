//! CLI command implementations.
//!
//! Each `run_*` function backs one `rag` subcommand. Results go to stdout;
//! logs go to stderr through `tracing`.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{AnswerRequest, DeleteOutcome};
use crate::pipeline::Pipeline;

/// Maximum characters of chunk text shown by `rag search`.
const SNIPPET_CHARS: usize = 160;

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let result = pipeline.ingest(path).await;
    pipeline.close().await?;

    let report = result?;
    println!(
        "Ingested {} (file_id={}, chunks={})",
        report.filename, report.file_id, report.chunks
    );
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let docs = pipeline.list_documents().await;
    pipeline.close().await?;

    let docs = docs?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    println!("{:<8} {:<25} FILENAME", "ID", "UPLOADED");
    for doc in docs {
        println!(
            "{:<8} {:<25} {}",
            doc.id,
            doc.upload_timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            doc.filename
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, file_id: i64) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let outcome = pipeline.delete(file_id).await;
    pipeline.close().await?;

    match outcome? {
        DeleteOutcome::Deleted {
            file_id,
            chunks_removed,
        } => {
            println!(
                "Deleted document {} ({} chunks removed)",
                file_id, chunks_removed
            );
            Ok(())
        }
        DeleteOutcome::NotFound { file_id, .. } => bail!("Document {} not found", file_id),
    }
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    session_id: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;
    let response = pipeline
        .answer(AnswerRequest {
            question: question.to_string(),
            session_id,
            model,
        })
        .await;
    pipeline.close().await?;

    let response = response?;
    println!("{}", response.answer);
    println!();
    println!("session_id: {}", response.session_id);
    println!("model: {}", response.model);
    Ok(())
}

pub async fn run_search(config: &Config, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }
    let pipeline = Pipeline::open(config).await?;
    let results = pipeline.search(query).await;
    pipeline.close().await?;

    let results = results?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, scored) in results.iter().enumerate() {
        let chunk = &scored.chunk;
        let snippet: String = chunk
            .text
            .chars()
            .take(SNIPPET_CHARS)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        println!(
            "{}. [{:.3}] {} (file_id={}, chunk={})",
            rank + 1,
            scored.score,
            chunk.source_filename,
            chunk.source_document_id,
            chunk.chunk_index
        );
        println!("    {}", snippet);
    }
    Ok(())
}
