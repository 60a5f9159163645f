//! Condensation strategies.
//!
//! A [`Condenser`] takes an ordered history, a [`Budget`] and the session's
//! [`CondenserState`], and returns a [`Condensation`]: a new history within
//! budget plus the events it dropped entirely. Condensers never mutate their
//! input.

mod attention;
mod recent;
mod registry;
mod resilient;
mod rolling;
mod summarizer;

pub use attention::{AttentionCondenser, ImportanceScorer, LlmImportanceScorer};
pub use recent::RecentEventsCondenser;
pub use registry::{Aggressiveness, CondenserBuilder, CondenserRegistry, CondenserSettings};
pub use resilient::ResilientCondenser;
pub use rolling::RollingCondenser;
pub use summarizer::{ExtractiveSummarizer, LlmSummarizer, SegmentSummarizer, SummaryRequest};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::budget::Budget;
use super::event::{Event, EventId};
use crate::error::{MemoryError, Result};

/// Where a session sits in the condensation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondensationPhase {
    #[default]
    AwaitingOverflow,
    Condensing,
    Stable,
}

/// Per-session condenser state, passed in and returned explicitly.
#[derive(Debug, Clone, Default)]
pub struct CondenserState {
    pub phase: CondensationPhase,
    /// Current condensed prefix, if the history starts with a summary.
    pub prefix: Option<Event>,
    /// Completed condensations in this session.
    pub condensations: u64,
}

impl CondenserState {
    pub(crate) fn after(mut self, history: &[Event]) -> Self {
        self.prefix = history.first().filter(|e| e.is_condensation()).cloned();
        self.condensations += 1;
        self
    }
}

/// Result of one condenser run.
#[derive(Debug, Clone)]
pub struct Condensation {
    pub history: Vec<Event>,
    /// Events dropped without being summarized.
    pub offloaded: Vec<Event>,
    pub summary: Option<EventId>,
    pub state: CondenserState,
    /// True when the deterministic fallback produced this result.
    pub fallback: bool,
}

impl Condensation {
    /// History returned as-is.
    pub fn unchanged(history: &[Event], state: CondenserState) -> Self {
        Self {
            history: history.to_vec(),
            offloaded: Vec::new(),
            summary: None,
            state,
            fallback: false,
        }
    }

    pub fn is_unchanged(&self, input: &[Event]) -> bool {
        self.offloaded.is_empty()
            && self.history.len() == input.len()
            && self.history.iter().zip(input).all(|(a, b)| a.id() == b.id())
    }

    pub fn summary_event(&self) -> Option<&Event> {
        let id = self.summary?;
        self.history.iter().find(|event| event.id() == id)
    }
}

/// Compression strategy over an ordered event sequence.
#[async_trait]
pub trait Condenser: Send + Sync {
    fn name(&self) -> &str;

    async fn condense(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
    ) -> Result<Condensation>;
}

/// Named condenser strategies selectable per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondenserStrategy {
    Recent,
    Rolling,
    Domain,
    Summarizing,
    Attention,
    FinancialSummarizing,
}

impl CondenserStrategy {
    pub const ALL: [CondenserStrategy; 6] = [
        CondenserStrategy::Recent,
        CondenserStrategy::Rolling,
        CondenserStrategy::Domain,
        CondenserStrategy::Summarizing,
        CondenserStrategy::Attention,
        CondenserStrategy::FinancialSummarizing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CondenserStrategy::Recent => "recent",
            CondenserStrategy::Rolling => "rolling",
            CondenserStrategy::Domain => "domain",
            CondenserStrategy::Summarizing => "summarizing",
            CondenserStrategy::Attention => "attention",
            CondenserStrategy::FinancialSummarizing => "financial_summarizing",
        }
    }

    pub fn requires_llm(&self) -> bool {
        matches!(
            self,
            CondenserStrategy::Summarizing
                | CondenserStrategy::Attention
                | CondenserStrategy::FinancialSummarizing
        )
    }
}

impl fmt::Display for CondenserStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CondenserStrategy {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CondenserStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| MemoryError::Config(format!("unknown condenser strategy: {s}")))
    }
}

/// Check the contract every condenser output must satisfy against its input.
///
/// - output within budget,
/// - live ids unique and never also listed as a source,
/// - every new live event is a condensation whose sources come from the input,
/// - offloaded events come from the input.
pub fn validate_condensation(
    input: &[Event],
    output: &Condensation,
    budget: &Budget,
) -> Result<()> {
    if !budget.fits(&output.history) {
        return Err(MemoryError::CondensationFailure(format!(
            "output uses {} units, budget is {}",
            budget.total(&output.history),
            budget
        )));
    }

    let mut known: HashSet<EventId> = input.iter().map(Event::id).collect();
    known.extend(input.iter().flat_map(|e| e.source_event_ids().iter().copied()));
    let input_ids: HashSet<EventId> = input.iter().map(Event::id).collect();

    let mut live = HashSet::new();
    for event in &output.history {
        if !live.insert(event.id()) {
            return Err(MemoryError::CondensationFailure(format!(
                "event {} appears twice in the output",
                event.id()
            )));
        }
        if !input_ids.contains(&event.id()) {
            if !event.is_condensation() {
                return Err(MemoryError::CondensationFailure(format!(
                    "output invents raw event {}",
                    event.id()
                )));
            }
            if let Some(unknown) = event.source_event_ids().iter().find(|id| !known.contains(id)) {
                return Err(MemoryError::CondensationFailure(format!(
                    "summary cites unknown source {unknown}"
                )));
            }
        }
    }

    for event in &output.history {
        if let Some(live_source) = event.source_event_ids().iter().find(|id| live.contains(id)) {
            return Err(MemoryError::CondensationFailure(format!(
                "source {live_source} is still live"
            )));
        }
    }

    if let Some(stray) = output.offloaded.iter().find(|e| !input_ids.contains(&e.id())) {
        return Err(MemoryError::CondensationFailure(format!(
            "offloaded event {} was not in the input",
            stray.id()
        )));
    }

    Ok(())
}
