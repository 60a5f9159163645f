//! Context bundle assembled for the next model call.

use serde::Serialize;

use super::domain::Domain;
use super::event::{Event, render_value};
use super::long_term::MemoryEntry;
use super::preferences::UserPreferences;
use crate::llm::Message;

/// Condensed history, retrieved knowledge and preferences for one turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub session_id: String,
    pub domain: Domain,
    pub history: Vec<Event>,
    pub retrieved: Vec<MemoryEntry>,
    pub preferences: UserPreferences,
    /// Long-term search failed; `retrieved` is empty because of it.
    pub retrieval_degraded: bool,
    /// Preferences could not be read; defaults were used.
    pub preferences_degraded: bool,
}

impl ContextBundle {
    /// System preamble with retrieved knowledge and preferences, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let mut sections = Vec::new();

        if !self.retrieved.is_empty() {
            let mut knowledge = format!("Relevant {} knowledge:", self.domain.label());
            for (idx, entry) in self.retrieved.iter().enumerate() {
                knowledge.push_str(&format!("\n[{}] {}", idx + 1, entry_text(entry)));
            }
            sections.push(knowledge);
        }

        if !self.preferences.is_empty() {
            let prefs = self
                .preferences
                .iter()
                .map(|(key, value)| format!("{key}={}", render_value(value)))
                .collect::<Vec<_>>()
                .join(", ");
            sections.push(format!("User preferences: {prefs}"));
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }

    /// Render the bundle as chat messages: preamble first, then history.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(system) = self.system_prompt() {
            messages.push(Message::system(system));
        }
        messages.extend(self.history.iter().map(event_message));
        messages
    }
}

fn entry_text(entry: &MemoryEntry) -> String {
    // Offloaded events are stored as their JSON serialization.
    match Event::from_json(&entry.text) {
        Ok(event) => event.render_line(),
        Err(_) => entry.text.clone(),
    }
}

fn event_message(event: &Event) -> Message {
    if event.is_condensation() {
        let mut content = format!("Summary of earlier conversation:\n{}", event.content());
        if !event.domain_fields().is_empty() {
            content.push_str("\nKey terms:");
            for (key, value) in event.domain_fields() {
                content.push_str(&format!("\n- {key}: {}", render_value(value)));
            }
        }
        return Message::system(content);
    }

    let mut content = event.content().to_string();
    if !event.domain_fields().is_empty() {
        let fields = event
            .domain_fields()
            .iter()
            .map(|(key, value)| format!("{key}: {}", render_value(value)))
            .collect::<Vec<_>>()
            .join("; ");
        if content.is_empty() {
            content = fields;
        } else {
            content = format!("{content}\n({fields})");
        }
    }
    Message::with_role(event.role(), content)
}
