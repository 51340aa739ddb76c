//! # docsage CLI
//!
//! ```bash
//! docsage --config ./config/docsage.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsage init` | Create the SQLite database and run schema migrations |
//! | `docsage ingest <paths...>` | Extract, chunk, embed and store files or directory trees |
//! | `docsage list` | List documents, newest first |
//! | `docsage get <id>` | Print a document's metadata and extracted text |
//! | `docsage summarize <id>` | Print the cached or a fresh summary |
//! | `docsage query "<text>"` | Answer a question over the corpus or one document |
//! | `docsage reindex [<id>]` | Re-chunk and re-embed stored text |
//! | `docsage delete <id>` | Remove a document and its chunks |
//! | `docsage serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docsage::service::DocumentService;
use docsage::{config, get, ingest, logging, migrate, search, server};

/// docsage: local document ingestion, summarization and question answering.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsage.example.toml` for every option.
#[derive(Parser)]
#[command(
    name = "docsage",
    version,
    about = "Local document ingestion, summarization and retrieval-augmented question answering"
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest files. Directories are walked recursively.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List stored documents.
    List,

    /// Print a document by id.
    Get { id: String },

    /// Summarize a document.
    Summarize {
        id: String,
        /// Ignore the cached summary and generate a new one.
        #[arg(long)]
        refresh: bool,
    },

    /// Ask a question.
    Query {
        text: String,
        /// Restrict retrieval to one document.
        #[arg(long = "doc")]
        document_id: Option<String>,
        /// Print the ranked chunks used as evidence.
        #[arg(long)]
        show_evidence: bool,
    },

    /// Re-chunk and re-embed one document, or all of them.
    Reindex { id: Option<String> },

    /// Delete a document and its chunks.
    Delete { id: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let service = DocumentService::open(&cfg).await?;
            match command {
                Commands::Ingest { paths } => ingest::run_ingest(&service, &paths).await?,
                Commands::List => get::run_list(&service).await?,
                Commands::Get { id } => get::run_get(&service, &id).await?,
                Commands::Summarize { id, refresh } => {
                    get::run_summarize(&service, &id, refresh).await?
                }
                Commands::Query {
                    text,
                    document_id,
                    show_evidence,
                } => {
                    search::run_query(&service, &text, document_id.as_deref(), show_evidence)
                        .await?
                }
                Commands::Reindex { id } => search::run_reindex(&service, id.as_deref()).await?,
                Commands::Delete { id } => {
                    service.delete(&id).await?;
                    println!("Deleted {}", id);
                }
                Commands::Init | Commands::Serve => {}
            }
        }
    }

    Ok(())
}
