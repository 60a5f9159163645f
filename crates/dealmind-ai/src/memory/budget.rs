//! Size budget of a live history.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::event::Event;

/// Maximum size a live history may occupy before condensation runs.
///
/// In TOML: `budget = { max_events = 50 }` or `budget = { max_bytes = 65536 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    MaxEvents(usize),
    MaxBytes(usize),
}

impl Default for Budget {
    fn default() -> Self {
        Budget::MaxEvents(50)
    }
}

impl Budget {
    pub fn limit(&self) -> usize {
        match self {
            Budget::MaxEvents(n) | Budget::MaxBytes(n) => *n,
        }
    }

    /// Cost of one event: 1 under a count budget, its JSON length otherwise.
    pub fn units(&self, event: &Event) -> usize {
        match self {
            Budget::MaxEvents(_) => 1,
            Budget::MaxBytes(_) => event.serialized_len(),
        }
    }

    pub fn total<'a>(&self, events: impl IntoIterator<Item = &'a Event>) -> usize {
        events.into_iter().map(|event| self.units(event)).sum()
    }

    pub fn fits(&self, events: &[Event]) -> bool {
        self.total(events) <= self.limit()
    }

    /// Units a trailing window may occupy for the given ratio.
    ///
    /// Count budgets always leave one slot for a summary event.
    pub fn window_units(&self, ratio: f32) -> usize {
        let limit = self.limit();
        let scaled = (limit as f64 * ratio.clamp(0.0, 1.0) as f64).floor() as usize;
        match self {
            Budget::MaxEvents(_) => scaled.max(1).min(limit.saturating_sub(1)),
            Budget::MaxBytes(_) => scaled.min(limit),
        }
    }

    /// Split index such that `events[split..]` is the longest suffix within `units`.
    pub fn suffix_start(&self, events: &[Event], units: usize) -> usize {
        let mut used = 0usize;
        let mut start = events.len();
        for (idx, event) in events.iter().enumerate().rev() {
            let cost = self.units(event);
            if used + cost > units {
                break;
            }
            used += cost;
            start = idx;
        }
        start
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::MaxEvents(n) => write!(f, "{n} events"),
            Budget::MaxBytes(n) => write!(f, "{n} bytes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::user(format!("message {i}")).unwrap())
            .collect()
    }

    #[test]
    fn test_count_budget_units() {
        let budget = Budget::MaxEvents(3);
        assert!(budget.fits(&events(3)));
        assert!(!budget.fits(&events(4)));
        assert_eq!(budget.total(&events(4)), 4);
    }

    #[test]
    fn test_byte_budget_units() {
        let history = events(2);
        let size = history[0].serialized_len() + history[1].serialized_len();
        assert!(Budget::MaxBytes(size).fits(&history));
        assert!(!Budget::MaxBytes(size - 1).fits(&history));
    }

    #[test]
    fn test_window_units_leave_room_for_summary() {
        assert_eq!(Budget::MaxEvents(10).window_units(0.5), 5);
        assert_eq!(Budget::MaxEvents(10).window_units(1.0), 9);
        assert_eq!(Budget::MaxEvents(10).window_units(0.0), 1);
        assert_eq!(Budget::MaxEvents(1).window_units(0.5), 0);
        assert_eq!(Budget::MaxBytes(1000).window_units(0.25), 250);
    }

    #[test]
    fn test_suffix_start() {
        let history = events(6);
        let budget = Budget::MaxEvents(10);
        assert_eq!(budget.suffix_start(&history, 4), 2);
        assert_eq!(budget.suffix_start(&history, 0), 6);
        assert_eq!(budget.suffix_start(&history, 100), 0);
    }

    #[test]
    fn test_budget_toml_shape() {
        #[derive(Deserialize)]
        struct Wrapper {
            budget: Budget,
        }
        let parsed: Wrapper = toml::from_str("budget = { max_bytes = 4096 }").unwrap();
        assert_eq!(parsed.budget, Budget::MaxBytes(4096));
    }
}
