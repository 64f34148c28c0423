//! # Doco CLI (`doco`)
//!
//! ## Usage
//!
//! ```bash
//! doco --config ./config/doco.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `doco init` | Create the SQLite database and schema |
//! | `doco ingest <file>` | Extract, chunk, embed and store a document |
//! | `doco ask "<question>"` | Answer from the stored chunks |
//! | `doco analyze <file>` | Summarize a document directly |
//! | `doco chat <file>` | Ingest, then ask questions interactively |
//! | `doco history list\|show\|clear` | Recent uploads |
//! | `doco theme show\|toggle\|set` | Theme preference |
//! | `doco purge` | Delete expired chunks |
//! | `doco stats` | Live and expired chunk counts |
//! | `doco serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doco::{ask, chat, client_state, config, ingest, logging, migrate, server, stats};
use doco_core::history::Theme;

/// Doco: upload a document, ask questions about it.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing keys take their defaults.
#[derive(Parser)]
#[command(
    name = "doco",
    about = "Doco — upload a document, ask questions about it",
    version,
    long_about = "Doco extracts text from documents, stores chunk embeddings with a \
    25-minute TTL, and answers questions with retrieval-augmented generation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/doco.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run more than once.
    Init,

    /// Ingest a document into the chunk store.
    Ingest {
        /// Path to the document.
        file: PathBuf,

        /// Media type. Guessed from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        /// Extract and chunk only; print counts without embedding or storing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ask a question about the ingested documents.
    Ask {
        question: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Summarize a document without storing it.
    Analyze {
        file: PathBuf,

        #[arg(long)]
        mime: Option<String>,

        /// Instruction sent with the document instead of the default summary prompt.
        #[arg(long)]
        prompt: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Ingest a document, then answer questions from stdin.
    Chat {
        file: PathBuf,

        #[arg(long)]
        mime: Option<String>,
    },

    /// Recent uploads (client-local).
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Theme preference (client-local).
    Theme {
        #[command(subcommand)]
        action: ThemeAction,
    },

    /// Delete expired chunks.
    Purge,

    /// Show live and expired chunk counts.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    /// Print the answer stored with an entry.
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },
    Clear,
}

#[derive(Subcommand)]
enum ThemeAction {
    Show,
    Toggle,
    Set {
        /// `light` or `dark`.
        theme: Theme,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // History and theme only need the client state path, so they run on
    // defaults when no config file exists.
    let cfg = match &cli.command {
        Commands::History { .. } | Commands::Theme { .. } if !cli.config.exists() => {
            config::Config::minimal()
        }
        _ => config::load_config(&cli.config)?,
    };
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            mime,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, &file, mime.as_deref(), dry_run).await?;
        }
        Commands::Ask { question, json } => {
            ask::run_ask(&cfg, &question, json).await?;
        }
        Commands::Analyze {
            file,
            mime,
            prompt,
            json,
        } => {
            ask::run_analyze(&cfg, &file, mime.as_deref(), prompt.as_deref(), json).await?;
        }
        Commands::Chat { file, mime } => {
            chat::run_chat(&cfg, &file, mime.as_deref()).await?;
        }
        Commands::History { action } => match action {
            HistoryAction::List => client_state::run_history_list(&cfg)?,
            HistoryAction::Show { id, json } => client_state::run_history_show(&cfg, &id, json)?,
            HistoryAction::Clear => client_state::run_history_clear(&cfg)?,
        },
        Commands::Theme { action } => match action {
            ThemeAction::Show => client_state::run_theme_show(&cfg)?,
            ThemeAction::Toggle => client_state::run_theme_toggle(&cfg)?,
            ThemeAction::Set { theme } => client_state::run_theme_set(&cfg, theme)?,
        },
        Commands::Purge => {
            stats::run_purge(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
