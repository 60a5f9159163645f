use async_trait::async_trait;

use super::{Condensation, Condenser, CondenserState};
use crate::error::Result;
use crate::memory::budget::Budget;
use crate::memory::event::Event;

/// Keeps the trailing events verbatim and offloads the rest.
///
/// Deterministic and infallible; every other strategy falls back to it.
#[derive(Debug, Clone)]
pub struct RecentEventsCondenser {
    window_ratio: f32,
}

impl Default for RecentEventsCondenser {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl RecentEventsCondenser {
    pub fn new(window_ratio: f32) -> Self {
        Self {
            window_ratio: window_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn window_ratio(&self) -> f32 {
        self.window_ratio
    }

    fn keep_units(&self, budget: &Budget) -> usize {
        let limit = budget.limit();
        let scaled = (limit as f64 * self.window_ratio as f64).floor() as usize;
        match budget {
            Budget::MaxEvents(_) => scaled.max(1).min(limit),
            Budget::MaxBytes(_) => scaled.min(limit),
        }
    }

    /// Synchronous condensation, used directly as the fallback path.
    pub fn condense_now(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
    ) -> Condensation {
        if budget.fits(history) {
            return Condensation::unchanged(history, state);
        }

        let start = budget.suffix_start(history, self.keep_units(budget));
        let kept = history[start..].to_vec();
        tracing::debug!(
            kept = kept.len(),
            offloaded = start,
            %budget,
            "Recent-events condensation"
        );

        Condensation {
            state: state.after(&kept),
            history: kept,
            offloaded: history[..start].to_vec(),
            summary: None,
            fallback: false,
        }
    }
}

#[async_trait]
impl Condenser for RecentEventsCondenser {
    fn name(&self) -> &str {
        "recent"
    }

    async fn condense(
        &self,
        history: &[Event],
        budget: &Budget,
        state: CondenserState,
    ) -> Result<Condensation> {
        Ok(self.condense_now(history, budget, state))
    }
}
