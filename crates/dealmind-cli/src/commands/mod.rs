mod ask;
mod knowledge;
mod prefs;
mod replay;

use anyhow::{Result, bail};
use dealmind_ai::Domain;
use serde_json::Value;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::setup;

pub async fn run(cli: Cli, config: CliConfig) -> Result<()> {
    let db_path = config.resolve_db_path(cli.db_path.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Ingest(args) => {
            let runtime = setup::prepare(&db_path, &config, config.memory.clone())?;
            knowledge::ingest(&runtime, args, format).await
        }
        Commands::Search(args) => {
            let runtime = setup::prepare(&db_path, &config, config.memory.clone())?;
            knowledge::search(&runtime, args, format).await
        }
        Commands::Replay(args) => {
            let memory = replay::memory_config(&config, &args)?;
            let runtime = setup::prepare(&db_path, &config, memory)?;
            replay::run(&runtime, args, format).await
        }
        Commands::Ask(args) => {
            let runtime = setup::prepare(&db_path, &config, config.memory.clone())?;
            ask::run(&runtime, args, format).await
        }
        Commands::Prefs { command } => {
            let runtime = setup::prepare(&db_path, &config, config.memory.clone())?;
            prefs::run(&runtime, command, format)
        }
    }
}

pub(crate) fn parse_domain(input: &str) -> Result<Domain> {
    Ok(input.parse::<Domain>()?)
}

/// Split `key=value`; values that parse as JSON keep their type.
pub(crate) fn parse_pair(input: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = input.split_once('=') else {
        bail!("Expected KEY=VALUE, got '{input}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in '{input}'");
    }
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
