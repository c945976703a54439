//! # docvault CLI (`dv`)
//!
//! ## Usage
//!
//! ```bash
//! dv --config ./config/dv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dv init` | Create the catalog and vector index databases |
//! | `dv upload <path> --owner <id>` | Store, extract and index a document |
//! | `dv list --owner <id>` | List an owner's documents |
//! | `dv show <doc-id> --owner <id>` | Show a document record and its indexed chunk count |
//! | `dv delete <doc-id> --owner <id>` | Delete a document, its file and its vector entries |
//! | `dv ask "<question>" --owner <id>` | Answer a question from the owner's documents |
//! | `dv retrieve "<question>" --owner <id>` | Show the nearest chunks, best first |
//! | `dv reindex [--owner <id>]` | Re-extract and re-index documents |
//!
//! Logs go to stderr (`RUST_LOG`, or `--verbose` for debug); results go to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docvault::config;
use docvault::engine::{Engine, UploadRequest};
use docvault::migrate;
use docvault_core::answer::NO_DOCUMENTS_MESSAGE;
use docvault_core::models::{DocumentId, OwnerId};
use docvault_core::retrieve::Retrieval;

/// docvault: ask questions about your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dv",
    about = "docvault: ask questions about your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dv.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog and vector index databases.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Upload a document for an owner.
    ///
    /// Accepted formats: .pdf, .png, .jpg, .jpeg, .txt. The file is copied
    /// into the upload directory, recorded, and indexed. Indexing problems
    /// are reported as warnings; the document is still stored.
    Upload {
        /// Path to the file to upload.
        path: PathBuf,
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Free-form metadata (e.g. JSON with doctor / hospital).
        #[arg(long)]
        metadata: Option<String>,
    },

    /// List an owner's documents.
    List {
        #[arg(long)]
        owner: i64,
    },

    /// Show one document record.
    Show {
        id: i64,
        #[arg(long)]
        owner: i64,
    },

    /// Delete a document, its stored file and its vector entries.
    Delete {
        id: i64,
        #[arg(long)]
        owner: i64,
    },

    /// Answer a question from the owner's documents.
    Ask {
        question: String,
        #[arg(long)]
        owner: i64,
    },

    /// Show the chunks retrieved for a question, best first.
    Retrieve {
        question: String,
        #[arg(long)]
        owner: i64,
        /// Number of chunks (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Re-extract and re-index documents.
    ///
    /// Use after changing the embedding model or to repair documents whose
    /// indexing failed at upload time.
    Reindex {
        /// Only reindex this owner's documents.
        #[arg(long)]
        owner: Option<i64>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let engine = Engine::open(&cfg).await?;
    let result = run(&engine, cli.command).await;
    engine.close().await;
    result
}

async fn run(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {}
        Commands::Upload {
            path,
            owner,
            category,
            description,
            metadata,
        } => {
            let report = engine
                .upload(
                    &path,
                    UploadRequest {
                        owner: OwnerId(owner),
                        category,
                        description,
                        metadata_info: metadata,
                    },
                )
                .await?;
            println!("uploaded {}", report.document.filename);
            println!("  id: {}", report.document.id);
            println!("  format: {}", report.document.format);
            println!("  chunks indexed: {}", report.chunks_indexed);
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            println!("ok");
        }
        Commands::List { owner } => {
            let docs = engine.list(OwnerId(owner)).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    doc.id,
                    doc.format,
                    doc.upload_date.format("%Y-%m-%d %H:%M:%S"),
                    doc.category.as_deref().unwrap_or("-"),
                    doc.filename
                );
            }
        }
        Commands::Show { id, owner } => {
            match engine.show(OwnerId(owner), DocumentId(id)).await? {
                Some(details) => println!("{}", serde_json::to_string_pretty(&details)?),
                None => anyhow::bail!("document not found: {}", id),
            }
        }
        Commands::Delete { id, owner } => {
            if engine.delete(OwnerId(owner), DocumentId(id)).await? {
                println!("deleted {}", id);
            } else {
                anyhow::bail!("document not found: {}", id);
            }
        }
        Commands::Ask { question, owner } => {
            println!("{}", engine.ask(&question, OwnerId(owner)).await);
        }
        Commands::Retrieve { question, owner, k } => {
            match engine.retrieve(&question, OwnerId(owner), k).await? {
                Retrieval::NoDocuments => {
                    println!("{}", NO_DOCUMENTS_MESSAGE);
                }
                Retrieval::Chunks(chunks) => {
                    if chunks.is_empty() {
                        println!("No indexed chunks.");
                    }
                    for (rank, chunk) in chunks.iter().enumerate() {
                        println!(
                            "{}. [{}] distance={:.4}",
                            rank + 1,
                            chunk.id,
                            chunk.distance
                        );
                        println!("   {}", chunk.text.replace('\n', "\n   "));
                    }
                }
            }
        }
        Commands::Reindex { owner } => {
            let report = engine.reindex(owner.map(OwnerId)).await?;
            println!("reindex");
            println!("  documents: {}", report.documents);
            println!("  chunks indexed: {}", report.chunks_indexed);
            for (id, reason) in &report.failures {
                println!("  failed {}: {}", id, reason);
            }
            println!("ok");
        }
    }
    Ok(())
}
