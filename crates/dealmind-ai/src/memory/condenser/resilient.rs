use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::recent::RecentEventsCondenser;
use super::{Condensation, Condenser, CondenserState, validate_condensation};
use crate::error::{MemoryError, Result};
use crate::memory::budget::Budget;
use crate::memory::event::Event;

/// Runs a non-deterministic condenser under a deadline.
///
/// Errors, timeouts and outputs that break the condenser contract all route
/// to [`RecentEventsCondenser`]; the returned condensation is then flagged
/// with `fallback = true`. This condenser therefore never fails.
pub struct ResilientCondenser {
    inner: Arc<dyn Condenser>,
    fallback: RecentEventsCondenser,
    timeout: Duration,
    name: String,
}

impl ResilientCondenser {
    pub fn new(inner: Arc<dyn Condenser>, fallback: RecentEventsCondenser, timeout: Duration) -> Self {
        let name = format!("resilient({})", inner.name());
        Self {
            inner,
            fallback,
            timeout,
            name,
        }
    }

    pub fn inner(&self) -> &Arc<dyn Condenser> {
        &self.inner
    }

    fn fall_back(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
        reason: &MemoryError,
    ) -> Condensation {
        tracing::warn!(
            condenser = self.inner.name(),
            error = %reason,
            "Condenser failed, using recent-events fallback"
        );
        let mut condensation = self.fallback.condense_now(history, budget, state);
        condensation.fallback = true;
        condensation
    }
}

#[async_trait]
impl Condenser for ResilientCondenser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn condense(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
    ) -> Result<Condensation> {
        let attempt =
            tokio::time::timeout(self.timeout, self.inner.condense(history, budget, state.clone()))
                .await;

        let outcome = match attempt {
            Ok(Ok(condensation)) => validate_condensation(history, &condensation, budget)
                .map(|_| condensation),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(MemoryError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(condensation) => Ok(condensation),
            Err(err) => Ok(self.fall_back(history, budget, state, &err)),
        }
    }
}
