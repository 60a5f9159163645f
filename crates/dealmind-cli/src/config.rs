//! CLI configuration file support
//!
//! Loads configuration from ~/.config/dealmind/config.toml

use anyhow::{Context, Result};
use dealmind_ai::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default database path
    pub db_path: Option<String>,
    /// Memory engine settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Embedding and LLM providers
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Offline feature hashing
    #[default]
    Hashing,
    OpenAI,
}

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    /// Embedding model for the OpenAI backend
    pub embedding_model: Option<String>,
    /// Vector width for the hashing backend
    pub embedding_dimension: Option<usize>,
    /// Chat model used for LLM condensers and `ask`
    pub llm_model: Option<String>,
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// OpenAI API key; falls back to OPENAI_API_KEY
    pub openai_api_key: Option<String>,
}

impl ProvidersConfig {
    pub fn openai_api_key(&self) -> Option<String> {
        self.openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(OPENAI_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl CliConfig {
    /// Load configuration from the default path; missing file means defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.memory.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dealmind").join("config.toml"))
    }

    /// Database path from the flag, the config file, or the data dir
    pub fn resolve_db_path(&self, flag: Option<&str>) -> Result<PathBuf> {
        if let Some(path) = flag.or(self.db_path.as_deref()) {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::data_dir()
            .context("Cannot determine a data directory; pass --db-path")?
            .join("dealmind");
        Ok(dir.join("dealmind.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealmind_ai::{Budget, CondenserStrategy, Domain};

    #[test]
    fn test_parse_sections() {
        let config = CliConfig::from_toml_str(
            r#"
db_path = "/tmp/dealmind.db"

[memory]
budget = { max_events = 12 }
default_strategy = "rolling"

[memory.strategies]
lbo = "financial_summarizing"

[providers]
embedding = "openai"
embedding_model = "text-embedding-3-large"
llm_model = "gpt-4o"
"#,
        )
        .unwrap();

        assert_eq!(config.db_path.as_deref(), Some("/tmp/dealmind.db"));
        assert_eq!(config.memory.budget, Budget::MaxEvents(12));
        assert_eq!(
            config.memory.strategy_for(Domain::Lbo),
            CondenserStrategy::FinancialSummarizing
        );
        assert_eq!(config.providers.embedding, EmbeddingBackend::OpenAI);
        assert_eq!(config.providers.llm_model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CliConfig::from_toml_str("").unwrap();
        assert_eq!(config.memory, MemoryConfig::default());
        assert_eq!(config.providers.embedding, EmbeddingBackend::Hashing);
    }

    #[test]
    fn test_invalid_memory_section_rejected() {
        assert!(CliConfig::from_toml_str("[memory]\nwindow_ratio = 2.0\n").is_err());
    }

    #[test]
    fn test_db_path_precedence() {
        let config = CliConfig {
            db_path: Some("/from/config.db".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_db_path(Some("/from/flag.db")).unwrap(),
            PathBuf::from("/from/flag.db")
        );
        assert_eq!(
            config.resolve_db_path(None).unwrap(),
            PathBuf::from("/from/config.db")
        );
    }
}
