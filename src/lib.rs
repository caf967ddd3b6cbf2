//! # RAG Harness
//!
//! A local-first retrieval-augmented answering service.
//!
//! Documents (PDF, DOCX, HTML) are extracted, split into overlapping
//! chunks, embedded, and stored in a persistent SQLite vector index.
//! Questions are rewritten against the chat history, matched against the
//! index, and answered by a language model from the retrieved context.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────── Pipeline ────────────────────────┐
//! question ──────▶│ Contextualizer ──▶ Retriever ──▶ Synthesizer ──▶ log     │──▶ answer
//!                 │      │                │              │                   │
//! document ──────▶│ Extract ─▶ Chunk ─▶ VectorIndex      ChatModel           │
//!                 └────────────────────────┬──────────────────────────────────┘
//!                                          ▼
//!                            SQLite (chunk_vectors, document_store,
//!                                    application_logs)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag ingest ./handbook.pdf
//! rag ask "What is the refund policy?"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed errors and their machine-checkable kinds |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF / DOCX / HTML text extraction |
//! | [`chunk`] | Recursive overlapping text chunking |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`llm`] | Chat-completion providers |
//! | [`prompt`] | Prompt templates |
//! | [`index`] | Vector index trait and backends |
//! | [`metadata`] | Document metadata and chat history store |
//! | [`contextualize`] | History-aware question rewriting |
//! | [`retrieve`] | Top-K retrieval |
//! | [`synthesize`] | Answer generation |
//! | [`pipeline`] | Orchestration of the above |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod contextualize;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
mod provider;
pub mod retrieve;
pub mod server;
pub mod synthesize;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ErrorKind, RagError};
pub use pipeline::{Pipeline, PipelineOptions};
