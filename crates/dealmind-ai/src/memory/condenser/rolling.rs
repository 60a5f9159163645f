//! Rolling condensation: one summary prefix followed by a raw window.
//!
//! Each run folds the previous summary and the events that overflowed the
//! window into a single new summary event. Only `prefix + overflow` is
//! re-summarized, so the cost per run is bounded by the window size, not by
//! the session length.
//!
//! When built with a domain, the condenser is schema-aware:
//!
//! - must-preserve fields of every consumed event are copied into the
//!   summary's `preserved` list, and the latest value per key into its
//!   `domain_fields`;
//! - overflowed events carrying must-preserve fields that a window event
//!   still cites are kept verbatim while slots remain, most recent first;
//! - window events evicted to fit a byte budget are folded into the summary
//!   rather than offloaded when they carry must-preserve fields.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::summarizer::{SegmentSummarizer, SummaryRequest};
use super::{Condensation, Condenser, CondenserState};
use crate::error::{MemoryError, Result};
use crate::memory::budget::Budget;
use crate::memory::domain::Domain;
use crate::memory::event::{Event, EventId, PreservedField};

pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 2000;

/// Lineage and structured content a new summary inherits.
#[derive(Debug, Default)]
struct SummaryStructure {
    sources: Vec<EventId>,
    preserved: Vec<PreservedField>,
    domain_fields: BTreeMap<String, Value>,
}

pub struct RollingCondenser<S: SegmentSummarizer> {
    summarizer: S,
    window_ratio: f32,
    max_summary_chars: usize,
    domain: Option<Domain>,
    name: String,
}

impl<S: SegmentSummarizer> RollingCondenser<S> {
    pub fn new(summarizer: S, window_ratio: f32) -> Self {
        Self {
            summarizer,
            window_ratio: window_ratio.clamp(0.0, 1.0),
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
            domain: None,
            name: "rolling".to_string(),
        }
    }

    /// Make the condenser schema-aware for `domain`.
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_max_summary_chars(mut self, max_summary_chars: usize) -> Self {
        self.max_summary_chars = max_summary_chars;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn domain_aware(&self) -> bool {
        self.domain.is_some()
    }

    fn structure(&self, prefix: Option<&Event>, consumed: &[Event]) -> SummaryStructure {
        let mut structure = SummaryStructure::default();
        if let Some(prefix) = prefix {
            structure.sources.extend_from_slice(prefix.source_event_ids());
            structure.preserved.extend_from_slice(prefix.preserved());
            structure.domain_fields = prefix.domain_fields().clone();
        }

        for event in consumed {
            if event.is_condensation() {
                structure.sources.extend_from_slice(event.source_event_ids());
                structure.preserved.extend_from_slice(event.preserved());
                for (key, value) in event.domain_fields() {
                    structure.domain_fields.insert(key.clone(), value.clone());
                }
                continue;
            }
            structure.sources.push(event.id());
            if self.domain_aware() {
                for field in event.must_preserve_fields() {
                    structure
                        .domain_fields
                        .insert(field.key.clone(), field.value.clone());
                    structure.preserved.push(field);
                }
            }
        }
        structure
    }

    /// Pick cited must-preserve overflow events to keep verbatim.
    fn select_retained(
        &self,
        prefix: Option<&Event>,
        overflow: &[Event],
        window: &[Event],
        budget: &Budget,
    ) -> HashSet<EventId> {
        let mut retained = HashSet::new();
        if !self.domain_aware() {
            return retained;
        }

        let cited: HashSet<EventId> = window
            .iter()
            .flat_map(|event| event.references().iter().copied())
            .collect();
        if cited.is_empty() {
            return retained;
        }

        let window_units = budget.total(window);
        let available = match budget {
            Budget::MaxEvents(limit) => limit.saturating_sub(1 + window_units),
            Budget::MaxBytes(limit) => {
                let skeleton = self.structure(prefix, overflow);
                let reserve = Event::condensation(
                    String::new(),
                    skeleton.domain_fields,
                    skeleton.preserved,
                    skeleton.sources,
                )
                .serialized_len()
                    + self.max_summary_chars;
                limit.saturating_sub(window_units + reserve)
            }
        };

        let mut used = 0usize;
        for event in overflow.iter().rev() {
            if !event.has_must_preserve_fields() || !cited.contains(&event.id()) {
                continue;
            }
            let cost = budget.units(event);
            if used + cost > available {
                break;
            }
            used += cost;
            retained.insert(event.id());
        }
        retained
    }

    async fn build_summary(&self, prefix: Option<&Event>, consumed: &[Event]) -> Result<Event> {
        let structure = self.structure(prefix, consumed);
        let raw: Vec<Event> = consumed
            .iter()
            .filter(|event| !event.is_condensation())
            .cloned()
            .collect();

        let text = self
            .summarizer
            .summarize(SummaryRequest {
                previous: prefix.map(Event::content),
                events: &raw,
                domain: self.domain,
                preserved: &structure.preserved,
                max_chars: self.max_summary_chars,
            })
            .await?;

        Ok(Event::condensation(
            text,
            structure.domain_fields,
            structure.preserved,
            structure.sources,
        ))
    }
}

#[async_trait]
impl<S: SegmentSummarizer> Condenser for RollingCondenser<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn condense(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
    ) -> Result<Condensation> {
        if budget.fits(history) {
            return Ok(Condensation::unchanged(history, state));
        }

        let (prefix, rest) = match history.first() {
            Some(first) if first.is_condensation() => (Some(first), &history[1..]),
            _ => (None, history),
        };

        let window_start = budget.suffix_start(rest, budget.window_units(self.window_ratio));
        let overflow = &rest[..window_start];
        let mut window: Vec<Event> = rest[window_start..].to_vec();

        let retained_ids = self.select_retained(prefix, overflow, &window, budget);
        let (mut retained, consumed): (Vec<Event>, Vec<Event>) = overflow
            .iter()
            .cloned()
            .partition(|event| retained_ids.contains(&event.id()));

        let mut summary = self.build_summary(prefix, &consumed).await?;
        let mut offloaded = Vec::new();
        let limit = budget.limit();

        loop {
            let total = budget.units(&summary) + budget.total(&retained) + budget.total(&window);
            if total <= limit {
                break;
            }
            if !window.is_empty() {
                let evicted = window.remove(0);
                if self.domain_aware() && evicted.has_must_preserve_fields() {
                    summary = summary.fold_sources(std::slice::from_ref(&evicted));
                } else {
                    offloaded.push(evicted);
                }
                continue;
            }
            if !retained.is_empty() {
                let evicted = retained.remove(0);
                summary = summary.fold_sources(std::slice::from_ref(&evicted));
                continue;
            }

            let excess = total - limit;
            let content_len = summary.content().len();
            if excess > content_len {
                return Err(MemoryError::CondensationFailure(format!(
                    "preserved fields alone need {} units, budget is {}",
                    budget.units(&summary.with_truncated_content(0)),
                    budget
                )));
            }
            summary = summary.with_truncated_content(content_len - excess);
        }

        tracing::debug!(
            condenser = %self.name,
            consumed = consumed.len(),
            retained = retained.len(),
            window = window.len(),
            offloaded = offloaded.len(),
            sources = summary.source_event_ids().len(),
            "Rolling condensation"
        );

        let summary_id = summary.id();
        let mut condensed = Vec::with_capacity(1 + retained.len() + window.len());
        condensed.push(summary);
        condensed.extend(retained);
        condensed.extend(window);

        Ok(Condensation {
            state: state.after(&condensed),
            history: condensed,
            offloaded,
            summary: Some(summary_id),
            fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::memory::condenser::summarizer::ExtractiveSummarizer;
    use crate::memory::condenser::validate_condensation;
    use crate::memory::event::EventPayload;
    use serde_json::json;

    fn turns(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::user(format!("turn {i}")).unwrap())
            .collect()
    }

    fn lbo(content: &str, key: &str, value: &str) -> Event {
        Event::domain(
            Role::User,
            Domain::Lbo,
            EventPayload::text(content).with_field(key, value),
        )
        .unwrap()
    }

    fn domain_condenser() -> RollingCondenser<ExtractiveSummarizer> {
        RollingCondenser::new(ExtractiveSummarizer, 0.5)
            .with_domain(Domain::Lbo)
            .with_name("domain")
    }

    #[tokio::test]
    async fn test_consumes_overflow_into_one_summary() {
        let history = turns(11);
        let budget = Budget::MaxEvents(10);
        let result = domain_condenser()
            .condense(&history, &budget, CondenserState::default())
            .await
            .unwrap();

        assert_eq!(result.history.len(), 6);
        let summary = result.summary_event().unwrap();
        let expected: Vec<EventId> = history[..6].iter().map(Event::id).collect();
        assert_eq!(summary.source_event_ids(), expected.as_slice());
        assert_eq!(result.history[0].id(), summary.id());
        assert!(result.offloaded.is_empty());
        assert_eq!(result.state.prefix.as_ref().map(Event::id), Some(summary.id()));
        validate_condensation(&history, &result, &budget).unwrap();
    }

    #[tokio::test]
    async fn test_lineage_stays_flat_across_runs() {
        let budget = Budget::MaxEvents(10);
        let condenser = domain_condenser();
        let mut history = turns(11);
        let first = condenser
            .condense(&history, &budget, CondenserState::default())
            .await
            .unwrap();

        history = first.history.clone();
        history.extend(turns(5));
        let second = condenser
            .condense(&history, &budget, first.state.clone())
            .await
            .unwrap();

        let summary = second.summary_event().unwrap();
        let first_summary = first.summary_event().unwrap();
        assert_eq!(summary.source_event_ids().len(), 11);
        assert_eq!(
            &summary.source_event_ids()[..6],
            first_summary.source_event_ids()
        );
        assert!(!summary.source_event_ids().contains(&first_summary.id()));
        assert_eq!(second.state.condensations, 2);
        validate_condensation(&history, &second, &budget).unwrap();
    }

    #[tokio::test]
    async fn test_preserved_fields_survive_with_recency() {
        let mut history = vec![lbo("Initial debt", "debt_terms", "4x EBITDA")];
        history.extend(turns(2));
        history.push(lbo("Revised debt", "debt_terms", "5x EBITDA senior"));
        history.extend(turns(7));

        let result = domain_condenser()
            .condense(&history, &Budget::MaxEvents(10), CondenserState::default())
            .await
            .unwrap();
        let summary = result.summary_event().unwrap();

        let values: Vec<&Value> = summary.preserved().iter().map(|f| &f.value).collect();
        assert_eq!(values, vec![&json!("4x EBITDA"), &json!("5x EBITDA senior")]);
        assert_eq!(summary.domain_fields()["debt_terms"], json!("5x EBITDA senior"));
        assert_eq!(summary.preserved()[0].source_event_id, history[0].id());
    }

    #[tokio::test]
    async fn test_cited_preserved_event_is_retained() {
        let terms = lbo("Exit assumptions", "exit_multiple", "8.5x");
        let mut history = vec![terms.clone()];
        history.extend(turns(5));
        history.extend(turns(4));
        history.push(
            Event::new(
                Role::User,
                crate::memory::event::EventKind::Message,
                EventPayload::text("Recheck the exit multiple").with_references(vec![terms.id()]),
            )
            .unwrap(),
        );

        let budget = Budget::MaxEvents(10);
        let result = domain_condenser()
            .condense(&history, &budget, CondenserState::default())
            .await
            .unwrap();

        assert_eq!(result.history[1].id(), terms.id());
        let summary = result.summary_event().unwrap();
        assert!(!summary.source_event_ids().contains(&terms.id()));
        validate_condensation(&history, &result, &budget).unwrap();
    }

    #[tokio::test]
    async fn test_plain_rolling_ignores_schema() {
        let mut history = vec![lbo("Debt", "debt_terms", "5x")];
        history.extend(turns(10));
        let result = RollingCondenser::new(ExtractiveSummarizer, 0.5)
            .condense(&history, &Budget::MaxEvents(10), CondenserState::default())
            .await
            .unwrap();
        assert!(result.summary_event().unwrap().preserved().is_empty());
    }

    #[tokio::test]
    async fn test_byte_budget_fits_after_truncation() {
        let history: Vec<Event> = (0..20)
            .map(|i| Event::user(format!("turn {i} with a longer body of text")).unwrap())
            .collect();
        let budget = Budget::MaxBytes(history[0].serialized_len() * 10);
        let result = RollingCondenser::new(ExtractiveSummarizer, 0.5)
            .condense(&history, &budget, CondenserState::default())
            .await
            .unwrap();

        assert!(budget.fits(&result.history));
        validate_condensation(&history, &result, &budget).unwrap();
    }

    #[tokio::test]
    async fn test_byte_budget_too_small_for_preserved_fails() {
        let history: Vec<Event> = (0..4)
            .map(|i| lbo(&format!("terms {i}"), "purchase_price", "1.2bn"))
            .collect();
        let err = domain_condenser()
            .condense(&history, &Budget::MaxBytes(64), CondenserState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::CondensationFailure(_)));
    }

    #[tokio::test]
    async fn test_under_budget_is_idempotent() {
        let history = turns(11);
        let budget = Budget::MaxEvents(10);
        let condenser = domain_condenser();
        let first = condenser
            .condense(&history, &budget, CondenserState::default())
            .await
            .unwrap();
        let again = condenser
            .condense(&first.history, &budget, first.state.clone())
            .await
            .unwrap();

        assert!(again.is_unchanged(&first.history));
        assert!(again.summary.is_none());
        assert_eq!(again.state.condensations, first.state.condensations);
    }
}
