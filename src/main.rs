//! # RAG Harness CLI (`rag`)
//!
//! Command-line front end for the retrieval-augmented answering service.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag ingest <file>` | Extract, chunk, embed and index a PDF, DOCX or HTML file |
//! | `rag list` | List ingested documents, newest first |
//! | `rag delete <id>` | Remove a document and its chunks |
//! | `rag ask "<question>"` | Answer a question from the indexed documents |
//! | `rag search "<query>"` | Show the chunks a question would retrieve |
//! | `rag serve` | Start the HTTP server |
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and written to
//! stderr. A `.env` file in the working directory is loaded first, so
//! `OPENAI_API_KEY` can live there.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_harness::{commands, config, server};

/// RAG Harness: ask questions about your PDF, DOCX and HTML documents.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest one document. The file extension selects the format.
    Ingest {
        /// Path to a .pdf, .docx or .html file.
        file: PathBuf,
    },

    /// List ingested documents.
    List,

    /// Delete a document and all of its indexed chunks.
    Delete {
        /// Document id as shown by `rag list`.
        file_id: i64,
    },

    /// Answer a question.
    Ask {
        question: String,

        /// Continue an existing chat session.
        #[arg(long)]
        session: Option<String>,

        /// Model to use: gpt-4o, gpt-4o-mini or gpt-4.1-mini.
        #[arg(long)]
        model: Option<String>,
    },

    /// Show the top-ranked chunks for a query, with similarity scores.
    Search { query: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Ingest { file } => commands::run_ingest(&cfg, &file).await?,
        Commands::List => commands::run_list(&cfg).await?,
        Commands::Delete { file_id } => commands::run_delete(&cfg, file_id).await?,
        Commands::Ask {
            question,
            session,
            model,
        } => commands::run_ask(&cfg, &question, session, model).await?,
        Commands::Search { query } => commands::run_search(&cfg, &query).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
