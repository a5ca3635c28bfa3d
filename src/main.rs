//! # legalctx CLI
//!
//! The `legalctx` binary is the primary interface to the legal retrieval
//! pipeline. It provides commands for ingesting statute text files,
//! querying the index, holding grounded conversations, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! legalctx --config ./config/legalctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `legalctx ingest <files>` | Chunk and index legal text files |
//! | `legalctx ask "<query>"` | Retrieve the most relevant provisions |
//! | `legalctx converse "<query>"` | Ask with conversation memory and citations |
//! | `legalctx count` | Print the number of indexed chunks |
//! | `legalctx serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Index the constitution, replacing whatever was there
//! legalctx ingest constitution.txt --clear
//!
//! # Plain retrieval
//! legalctx ask "What does the constitution say about the right to life?"
//!
//! # Conversational QA in a named session
//! legalctx converse "And what about slavery?" --session review
//!
//! # Start the HTTP API
//! legalctx serve --config ./config/legalctx.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use legalctx::config::{self, Config};
use legalctx::engine::{IngestDocument, QaEngine};
use legalctx::server;

/// legalctx CLI — retrieval-grounded question answering over legal
/// documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/legalctx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "legalctx",
    about = "Retrieval-grounded question answering over legal documents",
    version,
    long_about = "legalctx chunks legal documents into citable units, indexes them in a vector \
    store with content-hash deduplication, and answers questions grounded in the retrieved \
    provisions, via a CLI and a JSON HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/legalctx.toml`. When the file does not exist,
    /// built-in defaults are used (in-memory index, hash embedder).
    #[arg(long, global = true, default_value = "./config/legalctx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk and index legal text files.
    ///
    /// Each file becomes one document whose source title is the file stem.
    /// Documents are split on Article/Chapter/Section headings where
    /// possible, deduplicated by content hash, and written in batches.
    /// Re-running on the same files is idempotent.
    Ingest {
        /// Text files to ingest.
        files: Vec<PathBuf>,

        /// Empty the index before writing.
        #[arg(long)]
        clear: bool,

        /// Override the batch size from config (chunks per index write).
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Retrieve the provisions most relevant to a query.
    ///
    /// Prints each surviving chunk with its source, heading, and
    /// similarity score. Only matches above the configured similarity
    /// threshold are shown.
    Ask {
        /// The question or search phrase.
        query: String,

        /// Number of results to return (1-20). Defaults to the configured
        /// `top_k`.
        #[arg(short)]
        k: Option<usize>,
    },

    /// Ask a question with conversation memory and citations.
    ///
    /// Retrieves relevant provisions, assembles them into a bounded
    /// context, generates an answer, and records the exchange in the
    /// session transcript. When nothing relevant is found the configured
    /// fallback message is printed and the transcript is left untouched.
    Converse {
        /// The question.
        query: String,

        /// Session id for conversation memory.
        #[arg(long, default_value = "default")]
        session: String,
    },

    /// Print the number of indexed chunks.
    Count,

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `/ask`, `/converse`, `/ingest`, `/count`, and `/health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Ingest {
            files,
            clear,
            batch_size,
        } => {
            run_ingest(cfg, &files, clear, batch_size).await?;
        }
        Commands::Ask { query, k } => {
            run_ask(cfg, &query, k).await?;
        }
        Commands::Converse { query, session } => {
            run_converse(cfg, &query, &session).await?;
        }
        Commands::Count => {
            let engine = QaEngine::from_config(cfg)?;
            println!("{} chunks indexed", engine.count().await?);
        }
        Commands::Serve => {
            let engine = QaEngine::from_config(cfg)?;
            server::run_server(engine).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    mut cfg: Config,
    files: &[PathBuf],
    clear: bool,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("No files given. Usage: legalctx ingest <files>");
    }
    if let Some(size) = batch_size {
        cfg.ingestion.batch_size = size;
    }

    let mut documents = Vec::new();
    for path in files {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let source = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(IngestDocument { source, text });
    }

    let engine = QaEngine::from_config(cfg)?;
    let report = engine.ingest_documents(&documents, clear).await?;

    println!(
        "Ingested {} chunks ({} duplicates skipped)",
        report.accepted, report.skipped_duplicates
    );
    for rejected in &report.rejected {
        println!("  rejected chunk {}: {}", rejected.index, rejected.reason);
    }
    println!("{} chunks indexed in total", engine.count().await?);

    Ok(())
}

async fn run_ask(cfg: Config, query: &str, k: Option<usize>) -> anyhow::Result<()> {
    let engine = QaEngine::from_config(cfg)?;
    let response = engine.ask(query, k).await?;

    println!("{}", response.message);
    for (i, result) in response.results.iter().enumerate() {
        println!();
        match &result.meta.heading {
            Some(heading) => println!(
                "{}. [{:.3}] {} ({})",
                i + 1,
                result.score,
                result.meta.source,
                heading
            ),
            None => println!("{}. [{:.3}] {}", i + 1, result.score, result.meta.source),
        }
        println!("   {}", result.content);
    }

    Ok(())
}

async fn run_converse(cfg: Config, query: &str, session: &str) -> anyhow::Result<()> {
    let engine = QaEngine::from_config(cfg)?;
    let response = engine.converse(query, session).await?;

    println!("{}", response.answer);
    if !response.references.is_empty() {
        println!();
        println!("References:");
        for reference in &response.references {
            println!("  - {}", reference.title);
        }
    }

    Ok(())
}
