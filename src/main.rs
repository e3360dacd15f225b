//! # Event Harvester CLI (`evh`)
//!
//! The `evh` binary initializes the database, runs the HTTP service the
//! browser extension talks to, and offers a few offline inspection commands.
//!
//! ## Usage
//!
//! ```bash
//! evh --config ./config/evh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `evh init` | Create the SQLite database and apply the schema |
//! | `evh serve` | Start the HTTP service |
//! | `evh chunk <file>` | Show how an `{"emails": [...]}` file would be chunked |
//! | `evh contacts <user>` | Print ranked contact suggestions for a user |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use event_harvester::blocks::build_blocks;
use event_harvester::chunk::chunk_blocks;
use event_harvester::config;
use event_harvester::db;
use event_harvester::migrate;
use event_harvester::models::EmailBatch;
use event_harvester::server;
use event_harvester::store::{ContactStore, SqliteStore};
use event_harvester::tokens::create_counter;

/// Event Harvester — turns scraped inbox text into calendar events.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/evh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "evh",
    about = "Event Harvester — LLM-backed calendar event extraction for a browser extension",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/evh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and the `events` and `contacts` tables.
    /// Idempotent.
    Init,

    /// Start the HTTP service.
    ///
    /// Requires `OPENAI_API_KEY` in the environment.
    Serve,

    /// Chunk an email batch without calling the LLM.
    ///
    /// Prints the number of blocks and, for each chunk, its token estimate.
    Chunk {
        /// JSON file shaped like `{"emails": [{"subject", "sender", "snippet", "gmailThread"}]}`.
        file: PathBuf,

        /// Override `[chunking].max_tokens`.
        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Print ranked contact suggestions for a user.
    Contacts {
        /// The user's email address.
        user: String,

        /// Maximum number of suggestions (default: all).
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // `chunk` works without a config file
    let cfg = match (&cli.command, config::load_config(&cli.config)) {
        (_, Ok(cfg)) => cfg,
        (Commands::Chunk { .. }, Err(_)) => config::Config::minimal(),
        (_, Err(e)) => return Err(e),
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Chunk { file, max_tokens } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let batch: EmailBatch = serde_json::from_str(&content)
                .with_context(|| format!("{} is not an email batch", file.display()))?;

            let counter = create_counter(&cfg.chunking.tokenizer)?;
            let budget = max_tokens.unwrap_or(cfg.chunking.max_tokens);
            let blocks = build_blocks(&batch.emails);
            let chunks = chunk_blocks(&blocks, budget, counter.as_ref());

            println!("chunk {} ({} tokenizer)", file.display(), counter.name());
            println!("  blocks: {}", blocks.len());
            println!("  budget: {}", budget);
            println!("  chunks: {}", chunks.len());
            for c in &chunks {
                println!("    [{}] {} tokens, {} chars", c.index, c.tokens, c.text.len());
            }
        }
        Commands::Contacts { user, limit } => {
            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;
            let store = SqliteStore::new(pool);
            let contacts = store.suggest(&user, limit).await?;
            if contacts.is_empty() {
                println!("No contacts for {}.", user);
            }
            for (i, contact) in contacts.iter().enumerate() {
                println!("{:>3}. {}", i + 1, contact);
            }
            store.pool().close().await;
        }
    }

    Ok(())
}
