use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "dealmind")]
#[command(version, about = "Dealmind - conversational memory for financial modeling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (defaults to ~/.local/share/dealmind/dealmind.db)
    #[arg(long, global = true, env = "DEALMIND_DB_PATH")]
    pub db_path: Option<String>,

    /// Config file (defaults to ~/.config/dealmind/config.toml)
    #[arg(long, global = true, env = "DEALMIND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a document to the knowledge base
    Ingest(IngestArgs),

    /// Search the knowledge base
    Search(SearchArgs),

    /// Feed a JSON transcript through a session and show what memory kept
    Replay(ReplayArgs),

    /// Answer one question with retrieved knowledge (needs an LLM key)
    Ask(AskArgs),

    /// User preference management
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },
}

#[derive(Args)]
pub struct IngestArgs {
    /// Domain namespace (general, lbo, ma, debt, lending)
    #[arg(long, default_value = "general")]
    pub domain: String,

    /// Document text
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub text: Option<String>,

    /// Read the document from a file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Extra metadata as key=value (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    #[arg(long, default_value = "general")]
    pub domain: String,

    /// Number of results
    #[arg(short, long, default_value_t = 5)]
    pub k: usize,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Transcript file: a JSON array of {"role", "content", "fields"} turns
    pub transcript: PathBuf,

    #[arg(long, default_value = "replay")]
    pub session: String,

    #[arg(long, default_value = "cli")]
    pub user: String,

    #[arg(long, default_value = "general")]
    pub domain: String,

    /// Override the configured budget with an event count
    #[arg(long, conflicts_with = "max_bytes")]
    pub max_events: Option<usize>,

    /// Override the configured budget with a byte size
    #[arg(long)]
    pub max_bytes: Option<usize>,

    /// Write the final history to long-term memory
    #[arg(long)]
    pub persist: bool,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    pub question: String,

    #[arg(long, default_value = "general")]
    pub domain: String,

    #[arg(long, default_value = "cli")]
    pub user: String,
}

#[derive(Subcommand)]
pub enum PrefsCommands {
    /// Show stored preferences
    Get {
        #[arg(long, default_value = "cli")]
        user: String,
    },

    /// Set preferences as key=value pairs
    Set {
        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },

    /// Remove a preference key
    Unset {
        #[arg(long, default_value = "cli")]
        user: String,

        key: String,
    },
}
