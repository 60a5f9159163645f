//! Memory engine configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{MemoryError, Result};
use crate::memory::{Budget, CondenserStrategy, Domain};

// Default configuration constants
const DEFAULT_WINDOW_RATIO: f32 = 0.5;
const DEFAULT_MAX_SUMMARY_CHARS: usize = 2000;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIEVAL_K: usize = 5;
const MIN_SUMMARY_CHARS: usize = 64;
const MIN_BYTE_BUDGET: usize = 512;

/// Memory engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Size budget of every session's live history
    pub budget: Budget,
    /// Share of the budget a rolling window keeps verbatim
    pub window_ratio: f32,
    pub max_summary_chars: usize,
    /// Strategy for domains without an entry in `strategies`
    pub default_strategy: CondenserStrategy,
    pub strategies: BTreeMap<Domain, CondenserStrategy>,
    pub llm_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    /// Long-term hits injected into each context bundle
    pub retrieval_k: usize,
    /// Write condensation-dropped events to long-term memory
    pub persist_offloaded: bool,
    /// Also write summary events to long-term memory
    pub persist_summaries: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget: Budget::default(),
            window_ratio: DEFAULT_WINDOW_RATIO,
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
            default_strategy: CondenserStrategy::Domain,
            strategies: BTreeMap::new(),
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            embedding_timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            persist_offloaded: true,
            persist_summaries: false,
        }
    }
}

impl MemoryConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MemoryError::Config(format!("invalid memory config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_strategy(mut self, domain: Domain, strategy: CondenserStrategy) -> Self {
        self.strategies.insert(domain, strategy);
        self
    }

    /// Configured strategy for `domain`.
    pub fn strategy_for(&self, domain: Domain) -> CondenserStrategy {
        self.strategies
            .get(&domain)
            .copied()
            .unwrap_or(self.default_strategy)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.budget {
            Budget::MaxEvents(n) if n < 2 => {
                return Err(MemoryError::Config(
                    "Event budget must allow at least 2 events".to_string(),
                ));
            }
            Budget::MaxBytes(n) if n < MIN_BYTE_BUDGET => {
                return Err(MemoryError::Config(format!(
                    "Byte budget must be at least {} bytes",
                    MIN_BYTE_BUDGET
                )));
            }
            _ => {}
        }

        if !(self.window_ratio > 0.0 && self.window_ratio <= 1.0) {
            return Err(MemoryError::Config(format!(
                "Window ratio must be in (0, 1], got {}",
                self.window_ratio
            )));
        }

        if self.max_summary_chars < MIN_SUMMARY_CHARS {
            return Err(MemoryError::Config(format!(
                "Summary length must be at least {} characters",
                MIN_SUMMARY_CHARS
            )));
        }

        if self.llm_timeout_secs == 0 || self.embedding_timeout_secs == 0 {
            return Err(MemoryError::Config(
                "Timeouts must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}
