//! Live event log of one session.

use std::collections::HashSet;
use std::sync::Arc;

use super::budget::Budget;
use super::condenser::{
    CondensationPhase, Condensation, Condenser, CondenserState, RecentEventsCondenser,
    validate_condensation,
};
use super::domain::Domain;
use super::event::{Event, EventId};
use crate::error::{MemoryError, Result};

/// What one condensation did to the log.
#[derive(Debug, Clone)]
pub struct CondensationReport {
    /// Name of the condenser that ran.
    pub condenser: String,
    /// Live events replaced by the summary.
    pub summarized: Vec<Event>,
    /// Live events dropped entirely; candidates for long-term memory.
    pub offloaded: Vec<Event>,
    pub summary: Option<Event>,
    pub fallback: bool,
    pub units_before: usize,
    pub units_after: usize,
}

impl CondensationReport {
    pub fn changed(&self) -> bool {
        self.units_before != self.units_after || !self.summarized.is_empty() || !self.offloaded.is_empty()
    }
}

/// Result of [`ConversationMemory::append`].
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub event_id: EventId,
    pub condensation: Option<CondensationReport>,
}

/// Ordered event log for one session under a budget.
pub struct ConversationMemory {
    session_id: String,
    domain: Domain,
    budget: Budget,
    condenser: Arc<dyn Condenser>,
    fallback: RecentEventsCondenser,
    events: Vec<Event>,
    state: CondenserState,
    seen: HashSet<EventId>,
}

impl ConversationMemory {
    pub fn new(
        session_id: impl Into<String>,
        domain: Domain,
        budget: Budget,
        condenser: Arc<dyn Condenser>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            domain,
            budget,
            condenser,
            fallback: RecentEventsCondenser::default(),
            events: Vec::new(),
            state: CondenserState::default(),
            seen: HashSet::new(),
        }
    }

    /// Recent-events condenser used when the active condenser misbehaves.
    pub fn with_fallback(mut self, fallback: RecentEventsCondenser) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    pub fn condenser_name(&self) -> &str {
        self.condenser.name()
    }

    pub fn state(&self) -> &CondenserState {
        &self.state
    }

    pub fn history(&self) -> &[Event] {
        &self.events
    }

    /// Owned copy of the live history.
    pub fn get_history(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn units(&self) -> usize {
        self.budget.total(&self.events)
    }

    /// Append a raw event, condensing if the budget is exceeded.
    pub async fn append(&mut self, event: Event) -> Result<AppendOutcome> {
        if self.seen.contains(&event.id()) {
            return Err(MemoryError::MalformedEvent(format!(
                "event {} was already appended to session {}",
                event.id(),
                self.session_id
            )));
        }
        if event.is_condensation() {
            return Err(MemoryError::MalformedEvent(
                "condensation events cannot be appended".to_string(),
            ));
        }
        if !event.source_event_ids().is_empty() {
            return Err(MemoryError::MalformedEvent(
                "raw events cannot carry source ids".to_string(),
            ));
        }

        let event_id = event.id();
        self.seen.insert(event_id);
        self.events.push(event);
        if self.state.phase == CondensationPhase::Stable {
            self.state.phase = CondensationPhase::AwaitingOverflow;
        }

        let condensation = if self.budget.fits(&self.events) {
            None
        } else {
            Some(self.condense().await?)
        };

        Ok(AppendOutcome {
            event_id,
            condensation,
        })
    }

    /// Run the active condenser and replace the live log with its output.
    pub async fn condense(&mut self) -> Result<CondensationReport> {
        let units_before = self.units();
        self.state.phase = CondensationPhase::Condensing;
        tracing::debug!(
            session_id = %self.session_id,
            condenser = self.condenser.name(),
            units = units_before,
            budget = %self.budget,
            "Condensing session history"
        );

        let attempt = self
            .condenser
            .condense(&self.events, &self.budget, self.state.clone())
            .await
            .and_then(|condensation| {
                self.check(&condensation)?;
                Ok(condensation)
            });

        let condensation = match attempt {
            Ok(condensation) => condensation,
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    condenser = self.condenser.name(),
                    error = %err,
                    "Condensation rejected, using recent-events fallback"
                );
                let mut fallback =
                    self.fallback
                        .condense_now(&self.events, &self.budget, self.state.clone());
                fallback.fallback = true;
                fallback
            }
        };

        let kept: HashSet<EventId> = condensation.history.iter().map(Event::id).collect();
        let offloaded_ids: HashSet<EventId> = condensation.offloaded.iter().map(Event::id).collect();
        let summarized: Vec<Event> = self
            .events
            .iter()
            .filter(|e| !kept.contains(&e.id()) && !offloaded_ids.contains(&e.id()))
            .cloned()
            .collect();
        let summary = condensation.summary_event().cloned();

        self.events = condensation.history;
        self.state = condensation.state;
        self.state.phase = CondensationPhase::Stable;

        let report = CondensationReport {
            condenser: self.condenser.name().to_string(),
            summarized,
            offloaded: condensation.offloaded,
            summary,
            fallback: condensation.fallback,
            units_before,
            units_after: self.units(),
        };

        if report.changed() {
            tracing::info!(
                session_id = %self.session_id,
                condenser = %report.condenser,
                summarized = report.summarized.len(),
                offloaded = report.offloaded.len(),
                fallback = report.fallback,
                units_before,
                units_after = report.units_after,
                "Session history condensed"
            );
        }
        Ok(report)
    }

    /// Session-level checks on top of the condenser contract.
    fn check(&self, condensation: &Condensation) -> Result<()> {
        validate_condensation(&self.events, condensation, &self.budget)?;
        for event in &condensation.history {
            if let Some(unknown) = event
                .source_event_ids()
                .iter()
                .find(|id| !self.seen.contains(id))
            {
                return Err(MemoryError::CondensationFailure(format!(
                    "summary {} cites {unknown}, which never existed in session {}",
                    event.id(),
                    self.session_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::memory::condenser::{ExtractiveSummarizer, RollingCondenser};
    use crate::memory::event::EventPayload;
    use async_trait::async_trait;

    fn domain_memory(budget: Budget) -> ConversationMemory {
        let condenser = RollingCondenser::new(ExtractiveSummarizer, 0.5).with_domain(Domain::Lbo);
        ConversationMemory::new("s-1", Domain::Lbo, budget, Arc::new(condenser))
    }

    /// Hands back its input untouched, even when it is over budget.
    struct LyingCondenser;

    #[async_trait]
    impl Condenser for LyingCondenser {
        fn name(&self) -> &str {
            "lying"
        }

        async fn condense(
            &self,
            history: &[Event],
            _budget: &Budget,
            state: CondenserState,
        ) -> Result<Condensation> {
            Ok(Condensation::unchanged(history, state))
        }
    }

    #[tokio::test]
    async fn test_append_under_budget() {
        let mut memory = domain_memory(Budget::MaxEvents(5));
        let outcome = memory.append(Event::user("hello").unwrap()).await.unwrap();
        assert!(outcome.condensation.is_none());
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.history()[0].id(), outcome.event_id);
        assert_eq!(memory.state().phase, CondensationPhase::AwaitingOverflow);
    }

    #[tokio::test]
    async fn test_duplicate_append_rejected() {
        let mut memory = domain_memory(Budget::MaxEvents(5));
        let event = Event::user("hello").unwrap();
        memory.append(event.clone()).await.unwrap();
        let err = memory.append(event).await.unwrap_err();
        assert!(matches!(err, MemoryError::MalformedEvent(_)));
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_condensation_event_rejected() {
        let mut memory = domain_memory(Budget::MaxEvents(5));
        let summary = Event::condensation(
            "s".into(),
            Default::default(),
            Vec::new(),
            vec![EventId::new()],
        );
        assert!(memory.append(summary).await.is_err());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_overflow_triggers_condensation() {
        let mut memory = domain_memory(Budget::MaxEvents(10));
        let mut ids = Vec::new();
        for i in 0..10 {
            let outcome = memory
                .append(Event::user(format!("turn {i}")).unwrap())
                .await
                .unwrap();
            assert!(outcome.condensation.is_none());
            ids.push(outcome.event_id);
        }
        let outcome = memory.append(Event::user("turn 10").unwrap()).await.unwrap();
        let report = outcome.condensation.unwrap();

        assert!(memory.len() <= 10);
        assert_eq!(report.summarized.len(), 6);
        assert!(!report.fallback);
        assert_eq!(
            report.summary.as_ref().unwrap().source_event_ids(),
            &ids[..6]
        );
        assert_eq!(memory.state().phase, CondensationPhase::Stable);
        assert_eq!(memory.state().condensations, 1);

        memory.append(Event::user("turn 11").unwrap()).await.unwrap();
        assert_eq!(memory.state().phase, CondensationPhase::AwaitingOverflow);
    }

    #[tokio::test]
    async fn test_contract_violation_uses_fallback() {
        let mut memory = ConversationMemory::new(
            "s-2",
            Domain::General,
            Budget::MaxEvents(4),
            Arc::new(LyingCondenser),
        );
        for i in 0..4 {
            memory
                .append(Event::user(format!("turn {i}")).unwrap())
                .await
                .unwrap();
        }
        let outcome = memory.append(Event::user("turn 4").unwrap()).await.unwrap();
        let report = outcome.condensation.unwrap();

        assert!(report.fallback);
        assert!(memory.units() <= 4);
        assert_eq!(report.offloaded.len() + memory.len(), 5);
    }

    #[tokio::test]
    async fn test_byte_budget_never_exceeded() {
        let probe = Event::user("turn 00 about the revolver").unwrap();
        let budget = Budget::MaxBytes(probe.serialized_len() * 12);
        let mut memory = domain_memory(budget);
        for i in 0..40 {
            let event = if i % 7 == 3 {
                Event::domain(
                    Role::User,
                    Domain::Lbo,
                    EventPayload::text(format!("turn {i:02} terms"))
                        .with_field("purchase_price", format!("{i}00m")),
                )
                .unwrap()
            } else {
                Event::user(format!("turn {i:02} about the revolver")).unwrap()
            };
            memory.append(event).await.unwrap();
            assert!(budget.fits(memory.history()));
        }
    }
}
