//! Immutable conversation events.
//!
//! An [`Event`] is one conversational turn, one domain fact or one synthetic
//! summary produced by a condenser. Identity and timestamp are assigned at
//! construction and cannot change afterwards; equality and hashing go by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use super::domain::Domain;
use crate::error::{MemoryError, Result};
use crate::llm::Role;

/// Unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MemoryError::MalformedEvent(format!("invalid event id '{s}': {e}")))
    }
}

/// Variant tag of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "domain", rename_all = "snake_case")]
pub enum EventKind {
    /// Plain conversational turn.
    Message,
    /// Turn or fact carrying structured fields of one domain.
    Domain(Domain),
    /// Synthetic summary created by a condenser.
    Condensation,
}

impl EventKind {
    pub fn domain(&self) -> Option<Domain> {
        match self {
            EventKind::Domain(domain) => Some(*domain),
            _ => None,
        }
    }

    pub fn is_condensation(&self) -> bool {
        matches!(self, EventKind::Condensation)
    }
}

/// A must-preserve field value folded into a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreservedField {
    pub key: String,
    pub value: Value,
    pub source_event_id: EventId,
    pub timestamp: DateTime<Utc>,
}

/// Structured content of an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub domain_fields: BTreeMap<String, Value>,
    /// Earlier events this one cites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<EventId>,
    /// Condensation events only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserved: Vec<PreservedField>,
}

impl EventPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.domain_fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, Value>) -> Self {
        self.domain_fields.extend(fields);
        self
    }

    pub fn with_references(mut self, references: Vec<EventId>) -> Self {
        self.references = references;
        self
    }
}

/// One record in a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    timestamp: DateTime<Utc>,
    role: Role,
    kind: EventKind,
    payload: EventPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    source_event_ids: Vec<EventId>,
}

impl Event {
    /// Create a validated raw event.
    ///
    /// Fails with [`MemoryError::MalformedEvent`] when the content is blank
    /// and there are no fields, when domain fields fall outside the schema,
    /// when a plain message carries fields, or when the kind is
    /// [`EventKind::Condensation`].
    pub fn new(role: Role, kind: EventKind, payload: EventPayload) -> Result<Self> {
        validate_raw(&kind, &payload)?;
        Ok(Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            role,
            kind,
            payload,
            source_event_ids: Vec::new(),
        })
    }

    pub fn user(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::User, EventKind::Message, EventPayload::text(content))
    }

    pub fn assistant(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::Assistant, EventKind::Message, EventPayload::text(content))
    }

    pub fn domain(role: Role, domain: Domain, payload: EventPayload) -> Result<Self> {
        Self::new(role, EventKind::Domain(domain), payload)
    }

    /// Summary event; only the condenser layer builds these.
    pub(crate) fn condensation(
        content: String,
        domain_fields: BTreeMap<String, Value>,
        preserved: Vec<PreservedField>,
        source_event_ids: Vec<EventId>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            role: Role::System,
            kind: EventKind::Condensation,
            payload: EventPayload {
                content,
                domain_fields,
                references: Vec::new(),
                preserved,
            },
            source_event_ids,
        }
    }

    /// Same summary with a shorter text, keeping id and lineage.
    pub(crate) fn with_truncated_content(&self, max_bytes: usize) -> Self {
        let mut event = self.clone();
        event.payload.content = truncate_at_char_boundary(&self.payload.content, max_bytes);
        event
    }

    /// Same summary with additional events folded into its structure.
    pub(crate) fn fold_sources(&self, events: &[Event]) -> Self {
        let mut event = self.clone();
        for folded in events {
            event.source_event_ids.push(folded.id);
            for field in folded.must_preserve_fields() {
                event
                    .payload
                    .domain_fields
                    .insert(field.key.clone(), field.value.clone());
                event.payload.preserved.push(field);
            }
        }
        event
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn content(&self) -> &str {
        &self.payload.content
    }

    pub fn domain_fields(&self) -> &BTreeMap<String, Value> {
        &self.payload.domain_fields
    }

    pub fn references(&self) -> &[EventId] {
        &self.payload.references
    }

    pub fn preserved(&self) -> &[PreservedField] {
        &self.payload.preserved
    }

    pub fn source_event_ids(&self) -> &[EventId] {
        &self.source_event_ids
    }

    pub fn is_condensation(&self) -> bool {
        self.kind.is_condensation()
    }

    /// Must-preserve fields carried by a domain event, in key order.
    pub fn must_preserve_fields(&self) -> Vec<PreservedField> {
        let Some(domain) = self.kind.domain() else {
            return Vec::new();
        };
        let schema = domain.schema();
        self.payload
            .domain_fields
            .iter()
            .filter(|(key, _)| schema.is_must_preserve(key))
            .map(|(key, value)| PreservedField {
                key: key.clone(),
                value: value.clone(),
                source_event_id: self.id,
                timestamp: self.timestamp,
            })
            .collect()
    }

    pub fn has_must_preserve_fields(&self) -> bool {
        self.kind.domain().is_some_and(|domain| {
            let schema = domain.schema();
            self.payload
                .domain_fields
                .keys()
                .any(|key| schema.is_must_preserve(key))
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| MemoryError::MalformedEvent(format!("invalid event JSON: {e}")))
    }

    /// Length of the JSON serialization in bytes.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(0)
    }

    /// One-line rendering used by summarizers and prompts.
    pub fn render_line(&self) -> String {
        self.render_line_without(|_| false)
    }

    /// Like [`Event::render_line`], leaving out fields whose key matches `skip`.
    pub(crate) fn render_line_without(&self, skip: impl Fn(&str) -> bool) -> String {
        let mut line = format!("{}: {}", self.role, self.payload.content.trim());
        let fields = self
            .payload
            .domain_fields
            .iter()
            .filter(|(key, _)| !skip(key))
            .map(|(key, value)| format!("{key}={}", render_value(value)))
            .collect::<Vec<_>>();
        if !fields.is_empty() {
            line.push_str(&format!(" [{}]", fields.join(", ")));
        }
        line
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn validate_raw(kind: &EventKind, payload: &EventPayload) -> Result<()> {
    if payload.content.trim().is_empty() && payload.domain_fields.is_empty() {
        return Err(MemoryError::MalformedEvent(
            "event has neither content nor domain fields".to_string(),
        ));
    }
    if !payload.preserved.is_empty() {
        return Err(MemoryError::MalformedEvent(
            "preserved fields are reserved for condensation events".to_string(),
        ));
    }
    match kind {
        EventKind::Message => {
            if !payload.domain_fields.is_empty() {
                return Err(MemoryError::MalformedEvent(
                    "plain messages cannot carry domain fields".to_string(),
                ));
            }
        }
        EventKind::Domain(domain) => {
            let schema = domain.schema();
            if let Some(key) = payload.domain_fields.keys().find(|k| !schema.contains(k)) {
                return Err(MemoryError::MalformedEvent(format!(
                    "field '{key}' is not part of the {domain} schema"
                )));
            }
        }
        EventKind::Condensation => {
            return Err(MemoryError::MalformedEvent(
                "condensation events are created by condensers only".to_string(),
            ));
        }
    }
    Ok(())
}

pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lbo_event() -> Event {
        Event::domain(
            Role::User,
            Domain::Lbo,
            EventPayload::text("Debt package agreed")
                .with_field("debt_terms", "5x EBITDA senior")
                .with_field("sponsor", "Acme Capital"),
        )
        .unwrap()
    }

    #[test]
    fn test_new_event_assigns_identity() {
        let a = Event::user("hello").unwrap();
        let b = Event::user("hello").unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a.source_event_ids().is_empty());
    }

    #[test]
    fn test_blank_event_rejected() {
        let err = Event::user("   ").unwrap_err();
        assert!(matches!(err, MemoryError::MalformedEvent(_)));
    }

    #[test]
    fn test_fields_only_domain_event_allowed() {
        let event = Event::domain(
            Role::User,
            Domain::Debt,
            EventPayload::default().with_field("maturity", "2031"),
        );
        assert!(event.is_ok());
    }

    #[test]
    fn test_unknown_schema_key_rejected() {
        let err = Event::domain(
            Role::User,
            Domain::Lbo,
            EventPayload::text("x").with_field("ltv", 0.6),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ltv"));
    }

    #[test]
    fn test_message_with_fields_rejected() {
        let result = Event::new(
            Role::User,
            EventKind::Message,
            EventPayload::text("x").with_field("debt_terms", "y"),
        );
        assert!(matches!(result, Err(MemoryError::MalformedEvent(_))));
    }

    #[test]
    fn test_condensation_kind_rejected() {
        let result = Event::new(
            Role::System,
            EventKind::Condensation,
            EventPayload::text("summary"),
        );
        assert!(matches!(result, Err(MemoryError::MalformedEvent(_))));
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let event = lbo_event();
        let json = event.to_json().unwrap();
        let parsed = Event::from_json(&json).unwrap();

        assert_eq!(parsed, event);
        assert_eq!(parsed.timestamp(), event.timestamp());
        assert_eq!(parsed.payload(), event.payload());
        assert_eq!(parsed.to_json().unwrap(), json);
        assert_eq!(event.serialized_len(), json.len());
    }

    #[test]
    fn test_kind_serialization_shape() {
        let value = serde_json::to_value(lbo_event()).unwrap();
        assert_eq!(value["kind"], json!({"type": "domain", "domain": "lbo"}));
        assert_eq!(value["role"], json!("user"));
    }

    #[test]
    fn test_must_preserve_fields_follow_schema() {
        let event = lbo_event();
        let preserved = event.must_preserve_fields();
        assert_eq!(preserved.len(), 1);
        assert_eq!(preserved[0].key, "debt_terms");
        assert_eq!(preserved[0].value, json!("5x EBITDA senior"));
        assert_eq!(preserved[0].source_event_id, event.id());
        assert!(event.has_must_preserve_fields());
        assert!(!Event::user("plain").unwrap().has_must_preserve_fields());
    }

    #[test]
    fn test_fold_sources_extends_lineage() {
        let raw = lbo_event();
        let summary = Event::condensation("s".into(), BTreeMap::new(), Vec::new(), Vec::new());
        let folded = summary.fold_sources(std::slice::from_ref(&raw));

        assert_eq!(folded.id(), summary.id());
        assert_eq!(folded.source_event_ids(), &[raw.id()]);
        assert_eq!(folded.domain_fields()["debt_terms"], json!("5x EBITDA senior"));
        assert_eq!(folded.preserved().len(), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_at_char_boundary("ab€cd", 3), "ab");
        assert_eq!(truncate_at_char_boundary("short", 10), "short");
    }
}
