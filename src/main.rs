//! # docrag CLI
//!
//! One binary, one subcommand per component. Each service runs as its own
//! process; they share the documents directory, the SQLite file and the
//! reindex sentinel.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create directories, the SQLite file and its schema |
//! | `docrag serve admin` | Start the document admin panel (port 8080) |
//! | `docrag serve api` | Start the OpenAI-compatible RAG API (port 8000) |
//! | `docrag chat` | Chat with a local document folder in the terminal |
//! | `docrag smoke` | Check a running API service |
//! | `docrag stats` | Print document-store statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Start both services
//! docrag serve admin &
//! docrag serve api &
//!
//! # Exercise the API, including a full reindex
//! docrag smoke --reload
//!
//! # Terminal chat over another folder
//! docrag chat --documents ~/papers --top-k 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docrag::{admin_server, api_server, config, prototype, smoke, stats, store, telemetry};

/// docrag: document admin panel, RAG chat API and terminal prototype.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for every option.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "Document admin panel, OpenAI-compatible RAG chat API and terminal chat prototype",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docrag.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, env = "DOCRAG_CONFIG", default_value = "./config/docrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the documents directory, the SQLite file and its tables.
    ///
    /// Idempotent.
    Init,

    /// Start one of the HTTP services.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Chat with a local document folder in the terminal.
    ///
    /// Builds or reuses its own index, answers a summary question and then
    /// offers an interactive session.
    Chat {
        /// Number of chunks retrieved per question.
        #[arg(long, default_value_t = 3)]
        top_k: usize,

        /// Documents folder (defaults to `[paths].documents_dir`).
        #[arg(long)]
        documents: Option<PathBuf>,

        /// Index directory (defaults to `[paths].index_dir`).
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Check a running API service.
    Smoke {
        /// Base URL of the API service.
        #[arg(long, default_value = smoke::DEFAULT_API_URL)]
        api_url: String,

        /// Also call `POST /reload`, which rebuilds the index.
        #[arg(long)]
        reload: bool,
    },

    /// Print document-store statistics.
    Stats,
}

#[derive(Subcommand)]
enum ServeService {
    /// Document admin panel (Basic auth).
    Admin,
    /// OpenAI-compatible RAG chat API.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();

    // Smoke only talks HTTP
    if let Commands::Smoke { api_url, reload } = &cli.command {
        smoke::run_smoke(&smoke::SmokeOptions {
            api_url: api_url.clone(),
            reload: *reload,
        })
        .await?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            store::DocumentStore::open(&cfg.paths.database, &cfg.paths.documents_dir).await?;
            if let Some(parent) = cfg.paths.index_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            println!("Database initialized: {}", cfg.paths.database.display());
            println!("Documents directory:  {}", cfg.paths.documents_dir.display());
        }
        Commands::Serve { service } => match service {
            ServeService::Admin => admin_server::run_admin_server(&cfg).await?,
            ServeService::Api => api_server::run_api_server(&cfg).await?,
        },
        Commands::Chat {
            top_k,
            documents,
            index_dir,
        } => {
            prototype::run_chat(
                &cfg,
                prototype::ChatOptions {
                    top_k: top_k.max(1),
                    documents_dir: documents,
                    index_dir,
                },
            )
            .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Smoke { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
