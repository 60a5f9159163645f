//! Long-term memory: embedded text chunks namespaced by domain.
//!
//! Entries are immutable once written. Search never fails from the caller's
//! point of view: embedding errors, timeouts and index errors degrade to an
//! empty result and are logged as [`MemoryError::RetrievalUnavailable`].
//! [`LongTermMemory::try_search`] exposes the typed error instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::domain::Domain;
use super::event::Event;
use super::vector_index::{IndexRecord, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};

pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored with every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EntryMetadata {
    pub fn new(domain: Domain, entry_type: impl Into<String>) -> Self {
        Self {
            domain,
            session_id: None,
            entry_type: entry_type.into(),
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Knowledge document added by a user or an ingestion job.
    pub fn document(domain: Domain) -> Self {
        Self::new(domain, "document")
    }

    /// Event dropped from a session by condensation or at session end.
    pub fn for_event(domain: Domain, entry_type: &str, session_id: &str, event: &Event) -> Self {
        Self::new(domain, entry_type)
            .with_session(session_id)
            .with_extra("event_id", event.id().to_string())
            .with_extra("role", event.role().as_str())
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    text: String,
    metadata: EntryMetadata,
}

/// A stored entry, with its distance when returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub text: String,
    pub metadata: EntryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// Durable, similarity-searchable knowledge shared across sessions.
pub struct LongTermMemory {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl LongTermMemory {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            timeout: DEFAULT_EMBEDDING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(err)) => Err(MemoryError::Llm(format!(
                "embedding with {} failed: {err}",
                self.embedder.model_name()
            ))),
            Err(_) => Err(MemoryError::Timeout(self.timeout)),
        }
    }

    /// Embed and store `text` under the `domain` namespace.
    pub async fn add_document(
        &self,
        text: &str,
        mut metadata: EntryMetadata,
        domain: Domain,
    ) -> Result<EntryId> {
        if text.trim().is_empty() {
            return Err(MemoryError::PersistenceFailure(
                "refusing to store an empty document".to_string(),
            ));
        }
        metadata.domain = domain;

        let vector = self
            .embed(text)
            .await
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))?;

        let id = EntryId::new();
        let payload = serde_json::to_vec(&StoredEntry {
            text: text.to_string(),
            metadata: metadata.clone(),
        })?;

        self.index
            .insert(IndexRecord {
                id: id.to_string(),
                namespace: domain.as_str().to_string(),
                vector,
                created_at: metadata.timestamp.timestamp_millis(),
                payload,
            })
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))?;

        tracing::debug!(
            entry_id = %id,
            domain = %domain,
            entry_type = %metadata.entry_type,
            "Stored long-term memory entry"
        );
        Ok(id)
    }

    /// Closest `k` entries to `query` in `domain`, or the typed failure.
    pub async fn try_search(&self, query: &str, domain: Domain, k: usize) -> Result<Vec<MemoryEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embed(query)
            .await
            .map_err(|e| MemoryError::RetrievalUnavailable(e.to_string()))?;
        let hits = self
            .index
            .query(&vector, k, domain.as_str())
            .map_err(|e| MemoryError::RetrievalUnavailable(e.to_string()))?;

        let mut entries = Vec::with_capacity(hits.len());
        for hit in hits {
            let stored: StoredEntry = serde_json::from_slice(&hit.payload).map_err(|e| {
                MemoryError::RetrievalUnavailable(format!("corrupt entry {}: {e}", hit.id))
            })?;
            entries.push(MemoryEntry {
                id: EntryId(hit.id),
                text: stored.text,
                metadata: stored.metadata,
                distance: Some(hit.distance),
            });
        }

        // Index ties break by insertion time; entries carry their own timestamp.
        entries.sort_by(|a, b| {
            a.distance
                .unwrap_or(f32::MAX)
                .total_cmp(&b.distance.unwrap_or(f32::MAX))
                .then_with(|| b.metadata.timestamp.cmp(&a.metadata.timestamp))
        });
        Ok(entries)
    }

    /// Closest `k` entries; empty when retrieval is unavailable.
    pub async fn search(&self, query: &str, domain: Domain, k: usize) -> Vec<MemoryEntry> {
        match self.try_search(query, domain, k).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(domain = %domain, error = %err, "Long-term retrieval unavailable");
                Vec::new()
            }
        }
    }

    pub fn delete(&self, id: &EntryId) -> Result<bool> {
        self.index
            .delete(id.as_str())
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))
    }
}
