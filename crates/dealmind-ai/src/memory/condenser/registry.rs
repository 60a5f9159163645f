//! (domain, strategy) → condenser lookup table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::attention::{AttentionCondenser, LlmImportanceScorer};
use super::recent::RecentEventsCondenser;
use super::resilient::ResilientCondenser;
use super::rolling::RollingCondenser;
use super::summarizer::{ExtractiveSummarizer, LlmSummarizer};
use super::{Condenser, CondenserStrategy};
use crate::error::MemoryError;
use crate::llm::LlmClient;
use crate::memory::domain::Domain;

/// How hard a user wants history compressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl Aggressiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggressiveness::Conservative => "conservative",
            Aggressiveness::Balanced => "balanced",
            Aggressiveness::Aggressive => "aggressive",
        }
    }

    /// Window ratio after applying this preference to the configured one.
    pub fn window_ratio(&self, configured: f32) -> f32 {
        match self {
            Aggressiveness::Conservative => 0.75,
            Aggressiveness::Balanced => configured,
            Aggressiveness::Aggressive => 0.25,
        }
    }
}

impl fmt::Display for Aggressiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggressiveness {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Aggressiveness::Conservative),
            "balanced" => Ok(Aggressiveness::Balanced),
            "aggressive" => Ok(Aggressiveness::Aggressive),
            other => Err(MemoryError::Config(format!("unknown aggressiveness: {other}"))),
        }
    }
}

/// Knobs a builder receives when instantiating a condenser for a session.
#[derive(Debug, Clone, Copy)]
pub struct CondenserSettings {
    pub domain: Domain,
    pub window_ratio: f32,
    pub max_summary_chars: usize,
    pub llm_timeout: Duration,
}

/// Factory for one registry entry.
pub type CondenserBuilder = Arc<dyn Fn(&CondenserSettings) -> Arc<dyn Condenser> + Send + Sync>;

/// Lookup table from `(domain, strategy)` to a condenser factory.
///
/// Built once at manager construction. LLM strategies are only registered
/// when an LLM client is available; unresolvable lookups fall back to the
/// recent-events strategy.
#[derive(Clone, Default)]
pub struct CondenserRegistry {
    builders: HashMap<(Domain, CondenserStrategy), CondenserBuilder>,
}

impl CondenserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in strategies for every domain.
    pub fn with_defaults(llm: Option<Arc<dyn LlmClient>>) -> Self {
        let mut registry = Self::new();
        for domain in Domain::ALL {
            registry.register_builtin(domain, llm.clone());
        }
        registry
    }

    fn register_builtin(&mut self, domain: Domain, llm: Option<Arc<dyn LlmClient>>) {
        self.register(domain, CondenserStrategy::Recent, |settings| {
            Arc::new(RecentEventsCondenser::new(settings.window_ratio))
        });
        self.register(domain, CondenserStrategy::Rolling, |settings| {
            Arc::new(
                RollingCondenser::new(ExtractiveSummarizer, settings.window_ratio)
                    .with_max_summary_chars(settings.max_summary_chars),
            )
        });
        self.register(domain, CondenserStrategy::Domain, |settings| {
            Arc::new(
                RollingCondenser::new(ExtractiveSummarizer, settings.window_ratio)
                    .with_domain(settings.domain)
                    .with_max_summary_chars(settings.max_summary_chars)
                    .with_name("domain"),
            )
        });

        let Some(llm) = llm else {
            return;
        };

        let summarizing_llm = llm.clone();
        self.register(domain, CondenserStrategy::Summarizing, move |settings| {
            let inner = RollingCondenser::new(
                LlmSummarizer::new(summarizing_llm.clone()),
                settings.window_ratio,
            )
            .with_max_summary_chars(settings.max_summary_chars)
            .with_name("summarizing");
            resilient(Arc::new(inner), settings)
        });

        let attention_llm = llm.clone();
        self.register(domain, CondenserStrategy::Attention, move |settings| {
            let inner = AttentionCondenser::new(
                LlmImportanceScorer::new(attention_llm.clone()),
                settings.window_ratio,
            )
            .with_domain(settings.domain);
            resilient(Arc::new(inner), settings)
        });

        self.register(domain, CondenserStrategy::FinancialSummarizing, move |settings| {
            let inner = RollingCondenser::new(LlmSummarizer::financial(llm.clone()), settings.window_ratio)
                .with_domain(settings.domain)
                .with_max_summary_chars(settings.max_summary_chars)
                .with_name("financial_summarizing");
            resilient(Arc::new(inner), settings)
        });
    }

    /// Register or replace the factory for `(domain, strategy)`.
    pub fn register<F>(&mut self, domain: Domain, strategy: CondenserStrategy, builder: F)
    where
        F: Fn(&CondenserSettings) -> Arc<dyn Condenser> + Send + Sync + 'static,
    {
        self.builders.insert((domain, strategy), Arc::new(builder));
    }

    pub fn contains(&self, domain: Domain, strategy: CondenserStrategy) -> bool {
        self.builders.contains_key(&(domain, strategy))
    }

    /// Instantiate the condenser for `(domain, strategy)`.
    ///
    /// Returns the strategy actually used, which is `Recent` when the
    /// requested pair is not registered.
    pub fn resolve(
        &self,
        strategy: CondenserStrategy,
        settings: &CondenserSettings,
    ) -> (CondenserStrategy, Arc<dyn Condenser>) {
        if let Some(builder) = self.builders.get(&(settings.domain, strategy)) {
            return (strategy, builder(settings));
        }

        tracing::debug!(
            domain = %settings.domain,
            requested = %strategy,
            "Condenser strategy unavailable, using recent events"
        );
        match self.builders.get(&(settings.domain, CondenserStrategy::Recent)) {
            Some(builder) => (CondenserStrategy::Recent, builder(settings)),
            None => (
                CondenserStrategy::Recent,
                Arc::new(RecentEventsCondenser::new(settings.window_ratio)),
            ),
        }
    }
}

fn resilient(inner: Arc<dyn Condenser>, settings: &CondenserSettings) -> Arc<dyn Condenser> {
    Arc::new(ResilientCondenser::new(
        inner,
        RecentEventsCondenser::new(settings.window_ratio),
        settings.llm_timeout,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn settings(domain: Domain) -> CondenserSettings {
        CondenserSettings {
            domain,
            window_ratio: 0.5,
            max_summary_chars: 2000,
            llm_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_llm_strategies_need_client() {
        let registry = CondenserRegistry::with_defaults(None);
        let (strategy, condenser) =
            registry.resolve(CondenserStrategy::Summarizing, &settings(Domain::Lbo));
        assert_eq!(strategy, CondenserStrategy::Recent);
        assert_eq!(condenser.name(), "recent");
        assert!(registry.contains(Domain::Lbo, CondenserStrategy::Domain));
        assert!(!registry.contains(Domain::Lbo, CondenserStrategy::Attention));
    }

    #[test]
    fn test_llm_strategies_are_wrapped() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("mock"));
        let registry = CondenserRegistry::with_defaults(Some(llm));

        let (strategy, condenser) =
            registry.resolve(CondenserStrategy::FinancialSummarizing, &settings(Domain::Debt));
        assert_eq!(strategy, CondenserStrategy::FinancialSummarizing);
        assert_eq!(condenser.name(), "resilient(financial_summarizing)");

        let (_, domain) = registry.resolve(CondenserStrategy::Domain, &settings(Domain::Debt));
        assert_eq!(domain.name(), "domain");
    }

    #[test]
    fn test_custom_registration_overrides() {
        let mut registry = CondenserRegistry::with_defaults(None);
        registry.register(Domain::Lending, CondenserStrategy::Rolling, |_| {
            Arc::new(RecentEventsCondenser::new(0.1))
        });
        let (_, condenser) = registry.resolve(CondenserStrategy::Rolling, &settings(Domain::Lending));
        assert_eq!(condenser.name(), "recent");
    }

    #[test]
    fn test_aggressiveness_window_ratio() {
        assert_eq!(Aggressiveness::Conservative.window_ratio(0.5), 0.75);
        assert_eq!(Aggressiveness::Balanced.window_ratio(0.6), 0.6);
        assert_eq!(Aggressiveness::Aggressive.window_ratio(0.5), 0.25);
        assert_eq!(
            "AGGRESSIVE".parse::<Aggressiveness>().unwrap(),
            Aggressiveness::Aggressive
        );
    }
}
