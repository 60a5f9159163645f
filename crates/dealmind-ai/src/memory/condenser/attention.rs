//! Importance-based condensation.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Condensation, Condenser, CondenserState};
use crate::error::{MemoryError, Result};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::memory::budget::Budget;
use crate::memory::domain::Domain;
use crate::memory::event::Event;

pub const IMPORTANCE_PROMPT: &str = include_str!("../templates/importance_prompt.md");

static SCORE_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*\]").expect("Invalid regex"));

/// Assigns one importance score per event; higher survives.
#[async_trait]
pub trait ImportanceScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, events: &[Event], domain: Option<Domain>) -> Result<Vec<f32>>;
}

/// Asks the LLM for a JSON array of scores in `[0, 1]`.
pub struct LlmImportanceScorer {
    llm: Arc<dyn LlmClient>,
}

impl LlmImportanceScorer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn parse_scores(text: &str, expected: usize) -> Result<Vec<f32>> {
        let array = SCORE_ARRAY.find(text).ok_or_else(|| {
            MemoryError::CondensationFailure("no score array in importance reply".to_string())
        })?;
        let scores: Vec<f32> = serde_json::from_str(array.as_str()).map_err(|e| {
            MemoryError::CondensationFailure(format!("unreadable importance scores: {e}"))
        })?;
        if scores.len() != expected {
            return Err(MemoryError::CondensationFailure(format!(
                "expected {expected} importance scores, got {}",
                scores.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(MemoryError::CondensationFailure(
                "importance scores must be finite".to_string(),
            ));
        }
        Ok(scores)
    }
}

#[async_trait]
impl ImportanceScorer for LlmImportanceScorer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn score(&self, events: &[Event], domain: Option<Domain>) -> Result<Vec<f32>> {
        let instructions = IMPORTANCE_PROMPT
            .replace("{domain_label}", domain.unwrap_or_default().label())
            .replace("{count}", &events.len().to_string());
        let listing = events
            .iter()
            .enumerate()
            .map(|(idx, event)| format!("{}. {}", idx + 1, event.render_line()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("{}\n\n---\n\n## Events\n\n{}", instructions, listing);

        let request = CompletionRequest::new(vec![Message::user(prompt)]).with_temperature(0.0);
        let response = self.llm.complete(request).await?;
        Self::parse_scores(response.text().unwrap_or_default(), events.len())
    }
}

/// Keeps the highest-scoring events in their original order.
///
/// Ties go to the more recent event. Everything else is offloaded. With a
/// domain, must-preserve fields of dropped events move into one summary
/// event placed first, and its cost comes out of the kept allowance.
pub struct AttentionCondenser<S: ImportanceScorer> {
    scorer: S,
    window_ratio: f32,
    domain: Option<Domain>,
}

impl<S: ImportanceScorer> AttentionCondenser<S> {
    pub fn new(scorer: S, window_ratio: f32) -> Self {
        Self {
            scorer,
            window_ratio: window_ratio.clamp(0.0, 1.0),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    fn keep_units(&self, budget: &Budget) -> usize {
        let limit = budget.limit();
        let scaled = (limit as f64 * self.window_ratio as f64).floor() as usize;
        match budget {
            Budget::MaxEvents(_) => scaled.max(1).min(limit),
            Budget::MaxBytes(_) => scaled.min(limit),
        }
    }
}

#[async_trait]
impl<S: ImportanceScorer> Condenser for AttentionCondenser<S> {
    fn name(&self) -> &str {
        "attention"
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

        let scores = self.scorer.score(history, self.domain).await?;
        if scores.len() != history.len() {
            return Err(MemoryError::CondensationFailure(format!(
                "scorer {} returned {} scores for {} events",
                self.scorer.name(),
                scores.len(),
                history.len()
            )));
        }

        let mut ranked: Vec<usize> = (0..history.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then_with(|| b.cmp(&a)));

        let allowance = self.keep_units(budget);
        let mut reserve = 0usize;
        let mut rounds = 0usize;
        let (keep, carrier) = loop {
            let keep = Self::select(history, &ranked, budget, allowance.saturating_sub(reserve));
            let Some(carrier) = self.carrier(history, &keep) else {
                break (keep, None);
            };
            let cost = budget.units(&carrier);
            rounds += 1;
            if cost <= reserve {
                break (keep, Some(carrier));
            }
            reserve = if rounds > history.len() { allowance.max(cost) } else { cost };
        };

        if let Some(carrier) = &carrier {
            let kept_units = budget.total(
                history
                    .iter()
                    .zip(&keep)
                    .filter(|(_, kept)| **kept)
                    .map(|(event, _)| event),
            );
            let total = budget.units(carrier) + kept_units;
            if total > budget.limit() {
                return Err(MemoryError::CondensationFailure(format!(
                    "preserved fields need {} units, budget is {}",
                    budget.units(carrier),
                    budget
                )));
            }
        }

        let mut kept = Vec::new();
        let mut offloaded = Vec::new();
        for (idx, event) in history.iter().enumerate() {
            if keep[idx] {
                kept.push(event.clone());
            } else if !(carrier.is_some() && event.is_condensation() && Self::carries(event)) {
                offloaded.push(event.clone());
            }
        }

        tracing::debug!(
            scorer = self.scorer.name(),
            kept = kept.len(),
            offloaded = offloaded.len(),
            carried = carrier.as_ref().map_or(0, |c| c.preserved().len()),
            "Attention condensation"
        );

        let summary = carrier.as_ref().map(Event::id);
        let history: Vec<Event> = carrier.into_iter().chain(kept).collect();
        Ok(Condensation {
            state: state.after(&history),
            history,
            offloaded,
            summary,
            fallback: false,
        })
    }
}

impl<S: ImportanceScorer> AttentionCondenser<S> {
    /// Greedy pick by rank within `allowance` units.
    fn select(history: &[Event], ranked: &[usize], budget: &Budget, allowance: usize) -> Vec<bool> {
        let mut keep = vec![false; history.len()];
        let mut used = 0usize;
        for &idx in ranked {
            let cost = budget.units(&history[idx]);
            if used + cost > allowance {
                if matches!(budget, Budget::MaxEvents(_)) {
                    break;
                }
                continue;
            }
            used += cost;
            keep[idx] = true;
        }
        keep
    }

    /// Whether dropping `event` would lose must-preserve data.
    fn carries(event: &Event) -> bool {
        if event.is_condensation() {
            !event.preserved().is_empty()
        } else {
            event.has_must_preserve_fields()
        }
    }

    /// Summary holding the must-preserve data of every dropped event.
    ///
    /// `None` when the condenser has no domain or nothing of that kind is
    /// dropped. Lineage stays flat: a dropped summary contributes its sources.
    fn carrier(&self, history: &[Event], keep: &[bool]) -> Option<Event> {
        let domain = self.domain?;
        let dropped: Vec<&Event> = history
            .iter()
            .zip(keep)
            .filter(|(event, kept)| !**kept && Self::carries(event))
            .map(|(event, _)| event)
            .collect();
        if dropped.is_empty() {
            return None;
        }

        let mut sources = Vec::new();
        let mut preserved = Vec::new();
        let mut domain_fields = BTreeMap::new();
        for event in dropped {
            if event.is_condensation() {
                sources.extend_from_slice(event.source_event_ids());
                preserved.extend_from_slice(event.preserved());
                domain_fields.extend(event.domain_fields().clone());
                continue;
            }
            sources.push(event.id());
            for field in event.must_preserve_fields() {
                domain_fields.insert(field.key.clone(), field.value.clone());
                preserved.push(field);
            }
        }

        let content = format!(
            "Carried {} terms from {} earlier events.",
            domain.label(),
            sources.len()
        );
        Some(Event::condensation(content, domain_fields, preserved, sources))
    }
}
