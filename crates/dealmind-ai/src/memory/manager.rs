//! Memory manager: the orchestrator across the three memory tiers.
//!
//! Each session owns a [`ConversationMemory`] behind a `tokio` mutex, so
//! appends and condensations on one session never interleave. After every
//! mutation the live history is published as an `Arc<Vec<Event>>` snapshot;
//! [`MemoryManager::get_context`] reads only that snapshot and never waits on
//! an in-flight condensation.
//!
//! Ending a session marks its writer closed under the same mutex, so an
//! append that raced the close lands in a freshly opened session instead of
//! the discarded log.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::budget::Budget;
use super::condenser::{CondenserRegistry, CondenserSettings, CondenserStrategy, RecentEventsCondenser};
use super::context::ContextBundle;
use super::conversation::{AppendOutcome, CondensationReport, ConversationMemory};
use super::domain::Domain;
use super::event::{Event, EventKind, EventPayload};
use super::long_term::{EntryId, EntryMetadata, LongTermMemory, MemoryEntry};
use super::preferences::{InMemoryPreferenceStore, PreferenceStore, UserPreferences};
use super::vector_index::InMemoryVectorIndex;
use crate::config::MemoryConfig;
use crate::embedding::HashingEmbedding;
use crate::error::{MemoryError, Result};
use crate::llm::{LlmClient, Role};

/// Identifies a session and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionKey {
    pub session_id: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Summary of an open session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub domain: Domain,
    pub strategy: CondenserStrategy,
    pub condenser: String,
    pub budget: Budget,
    pub events: usize,
}

/// Writer-side state of a session.
struct SessionWriter {
    memory: ConversationMemory,
    closed: bool,
}

struct SessionHandle {
    user_id: String,
    domain: Domain,
    strategy: CondenserStrategy,
    condenser: String,
    budget: Budget,
    writer: Mutex<SessionWriter>,
    published: RwLock<Arc<Vec<Event>>>,
}

impl SessionHandle {
    fn check_owner(&self, key: &SessionKey) -> Result<()> {
        if self.user_id != key.user_id {
            return Err(MemoryError::MalformedEvent(format!(
                "session {} belongs to another user",
                key.session_id
            )));
        }
        Ok(())
    }

    fn publish(&self, history: &[Event]) {
        *self.published.write() = Arc::new(history.to_vec());
    }

    fn snapshot(&self) -> Arc<Vec<Event>> {
        self.published.read().clone()
    }

    fn info(&self, session_id: &str) -> SessionInfo {
        SessionInfo {
            session_id: session_id.to_string(),
            user_id: self.user_id.clone(),
            domain: self.domain,
            strategy: self.strategy,
            condenser: self.condenser.clone(),
            budget: self.budget,
            events: self.snapshot().len(),
        }
    }
}

/// Coordinates conversation memory, long-term memory and preferences.
pub struct MemoryManager {
    config: MemoryConfig,
    long_term: Arc<LongTermMemory>,
    preferences: Arc<dyn PreferenceStore>,
    registry: CondenserRegistry,
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl MemoryManager {
    pub fn new(
        config: MemoryConfig,
        long_term: Arc<LongTermMemory>,
        preferences: Arc<dyn PreferenceStore>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: CondenserRegistry::with_defaults(llm),
            config,
            long_term,
            preferences,
            sessions: DashMap::new(),
        })
    }

    /// Manager backed by the hashing embedder and in-process stores.
    pub fn in_memory(config: MemoryConfig, llm: Option<Arc<dyn LlmClient>>) -> Result<Self> {
        let long_term = LongTermMemory::new(
            Arc::new(HashingEmbedding::default()),
            Arc::new(InMemoryVectorIndex::new()),
        )
        .with_timeout(config.embedding_timeout());
        Self::new(
            config,
            Arc::new(long_term),
            Arc::new(InMemoryPreferenceStore::new()),
            llm,
        )
    }

    /// Replace the condenser lookup table.
    pub fn with_registry(mut self, registry: CondenserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn long_term(&self) -> &Arc<LongTermMemory> {
        &self.long_term
    }

    fn read_preferences(&self, user_id: &str) -> (UserPreferences, bool) {
        match self.preferences.get(user_id) {
            Ok(preferences) => (preferences, false),
            Err(err) => {
                tracing::warn!(user_id, error = %err, "Preferences unavailable, using defaults");
                (UserPreferences::default(), true)
            }
        }
    }

    /// Open a session, or return the already-open one.
    ///
    /// The condenser comes from the user's `condenser` preference, then the
    /// configured strategy for the domain, then the configured default.
    /// `aggressiveness` scales the window ratio.
    pub fn open_session(&self, key: &SessionKey, domain: Option<Domain>) -> Result<SessionInfo> {
        let handle = self.session(key, domain)?;
        Ok(handle.info(&key.session_id))
    }

    fn session(&self, key: &SessionKey, domain: Option<Domain>) -> Result<Arc<SessionHandle>> {
        if let Some(handle) = self.sessions.get(&key.session_id) {
            handle.check_owner(key)?;
            return Ok(handle.clone());
        }

        let (preferences, _) = self.read_preferences(&key.user_id);
        let domain = domain
            .or_else(|| preferences.default_domain())
            .unwrap_or_default();
        let requested = preferences
            .condenser()
            .unwrap_or_else(|| self.config.strategy_for(domain));
        let window_ratio = preferences
            .aggressiveness()
            .unwrap_or_default()
            .window_ratio(self.config.window_ratio);

        let settings = CondenserSettings {
            domain,
            window_ratio,
            max_summary_chars: self.config.max_summary_chars,
            llm_timeout: self.config.llm_timeout(),
        };
        let (strategy, condenser) = self.registry.resolve(requested, &settings);
        tracing::debug!(
            session_id = %key.session_id,
            domain = %domain,
            %requested,
            %strategy,
            window_ratio,
            "Opening session"
        );

        let memory = ConversationMemory::new(
            key.session_id.clone(),
            domain,
            self.config.budget,
            condenser.clone(),
        )
        .with_fallback(RecentEventsCondenser::new(window_ratio));
        let handle = Arc::new(SessionHandle {
            user_id: key.user_id.clone(),
            domain,
            strategy,
            condenser: condenser.name().to_string(),
            budget: self.config.budget,
            writer: Mutex::new(SessionWriter {
                memory,
                closed: false,
            }),
            published: RwLock::new(Arc::new(Vec::new())),
        });

        let handle = self
            .sessions
            .entry(key.session_id.clone())
            .or_insert(handle)
            .clone();
        handle.check_owner(key)?;
        Ok(handle)
    }

    fn open_handle(&self, key: &SessionKey) -> Result<Option<Arc<SessionHandle>>> {
        let Some(handle) = self.sessions.get(&key.session_id).map(|h| h.clone()) else {
            return Ok(None);
        };
        handle.check_owner(key)?;
        Ok(Some(handle))
    }

    pub fn session_info(&self, key: &SessionKey) -> Option<SessionInfo> {
        let handle = self.sessions.get(&key.session_id)?.clone();
        Some(handle.info(&key.session_id))
    }

    #[tracing::instrument(skip(self, text), fields(session_id = %key.session_id))]
    pub async fn add_user_message(
        &self,
        key: &SessionKey,
        text: &str,
        domain: Domain,
    ) -> Result<AppendOutcome> {
        let event = Event::new(Role::User, message_kind(domain), EventPayload::text(text))?;
        self.append_event(key, domain, event).await
    }

    #[tracing::instrument(skip(self, text), fields(session_id = %key.session_id))]
    pub async fn add_assistant_message(
        &self,
        key: &SessionKey,
        text: &str,
        domain: Domain,
    ) -> Result<AppendOutcome> {
        let event = Event::new(Role::Assistant, message_kind(domain), EventPayload::text(text))?;
        self.append_event(key, domain, event).await
    }

    /// Append a turn carrying structured domain fields.
    #[tracing::instrument(skip(self, text, domain_fields), fields(session_id = %key.session_id))]
    pub async fn add_domain_message(
        &self,
        key: &SessionKey,
        role: Role,
        text: &str,
        domain: Domain,
        domain_fields: BTreeMap<String, Value>,
    ) -> Result<AppendOutcome> {
        let payload = EventPayload::text(text).with_fields(domain_fields);
        let event = Event::domain(role, domain, payload)?;
        self.append_event(key, domain, event).await
    }

    /// Append a pre-built event, condensing and offloading as needed.
    #[tracing::instrument(skip(self, event), fields(session_id = %key.session_id, event_id = %event.id()))]
    pub async fn append_event(
        &self,
        key: &SessionKey,
        domain: Domain,
        event: Event,
    ) -> Result<AppendOutcome> {
        let (handle, outcome) = loop {
            let handle = self.session(key, Some(domain))?;
            let mut writer = handle.writer.lock().await;
            if writer.closed {
                tracing::debug!("Session closed while waiting, reopening");
                continue;
            }
            let outcome = writer.memory.append(event).await?;
            handle.publish(writer.memory.history());
            drop(writer);
            break (handle, outcome);
        };

        if let Some(report) = &outcome.condensation {
            self.persist_report(&key.session_id, handle.domain, report).await;
        }
        Ok(outcome)
    }

    /// Force a condensation pass on a session.
    #[tracing::instrument(skip(self), fields(session_id = %key.session_id))]
    pub async fn condense_session(&self, key: &SessionKey) -> Result<Option<CondensationReport>> {
        let Some(handle) = self.open_handle(key)? else {
            return Ok(None);
        };
        let report = {
            let mut writer = handle.writer.lock().await;
            if writer.closed {
                return Ok(None);
            }
            let report = writer.memory.condense().await?;
            handle.publish(writer.memory.history());
            report
        };
        self.persist_report(&key.session_id, handle.domain, &report).await;
        Ok(Some(report))
    }

    /// Best-effort write of condensation leftovers to long-term memory.
    async fn persist_report(&self, session_id: &str, domain: Domain, report: &CondensationReport) {
        if self.config.persist_offloaded {
            for event in &report.offloaded {
                self.persist_event_best_effort(session_id, domain, "offload", event)
                    .await;
            }
        }
        if self.config.persist_summaries
            && let Some(summary) = &report.summary
        {
            self.persist_event_best_effort(session_id, domain, "summary", summary)
                .await;
        }
    }

    async fn persist_event_best_effort(
        &self,
        session_id: &str,
        domain: Domain,
        entry_type: &str,
        event: &Event,
    ) {
        if let Err(err) = self.persist_event(session_id, domain, entry_type, event).await {
            tracing::warn!(
                session_id,
                event_id = %event.id(),
                entry_type,
                error = %err,
                "Failed to persist event to long-term memory"
            );
        }
    }

    async fn persist_event(
        &self,
        session_id: &str,
        session_domain: Domain,
        entry_type: &str,
        event: &Event,
    ) -> Result<EntryId> {
        let domain = event.kind().domain().unwrap_or(session_domain);
        let metadata = EntryMetadata::for_event(domain, entry_type, session_id, event);
        let text = event
            .to_json()
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))?;
        self.long_term.add_document(&text, metadata, domain).await
    }

    /// Snapshot of history, retrieved knowledge and preferences.
    ///
    /// Never fails and never writes; degraded parts are flagged.
    #[tracing::instrument(skip(self, user_query), fields(session_id = %key.session_id))]
    pub async fn get_context(
        &self,
        key: &SessionKey,
        user_query: &str,
        domain: Domain,
        k: Option<usize>,
    ) -> ContextBundle {
        let history = self
            .sessions
            .get(&key.session_id)
            .map(|handle| handle.snapshot())
            .unwrap_or_default();

        let k = k.unwrap_or(self.config.retrieval_k);
        let (retrieved, retrieval_degraded) =
            match self.long_term.try_search(user_query, domain, k).await {
                Ok(entries) => (entries, false),
                Err(err) => {
                    tracing::warn!(domain = %domain, error = %err, "Long-term retrieval unavailable");
                    (Vec::new(), true)
                }
            };
        let (preferences, preferences_degraded) = self.read_preferences(&key.user_id);

        ContextBundle {
            session_id: key.session_id.clone(),
            domain,
            history: history.as_ref().clone(),
            retrieved,
            preferences,
            retrieval_degraded,
            preferences_degraded,
        }
    }

    /// Live history of a session; empty when the session is not open.
    pub fn history(&self, key: &SessionKey) -> Vec<Event> {
        self.sessions
            .get(&key.session_id)
            .map(|handle| handle.snapshot().as_ref().clone())
            .unwrap_or_default()
    }

    #[tracing::instrument(skip(self, text, metadata))]
    pub async fn add_knowledge_document(
        &self,
        text: &str,
        metadata: EntryMetadata,
        domain: Domain,
    ) -> Result<EntryId> {
        let id = self.long_term.add_document(text, metadata, domain).await?;
        tracing::info!(entry_id = %id, domain = %domain, "Knowledge document added");
        Ok(id)
    }

    #[tracing::instrument(skip(self, query))]
    pub async fn search_knowledge(&self, query: &str, domain: Domain, k: usize) -> Vec<MemoryEntry> {
        self.long_term.search(query, domain, k).await
    }

    /// Close a session, optionally persisting its remaining history.
    ///
    /// Returns the number of events written. Persistence errors are
    /// surfaced; the session is closed either way. Only the owning user may
    /// end a session.
    #[tracing::instrument(skip(self), fields(session_id = %key.session_id))]
    pub async fn end_session(&self, key: &SessionKey, persist: bool) -> Result<usize> {
        let Some(handle) = self.open_handle(key)? else {
            return Ok(0);
        };

        let history = {
            let mut writer = handle.writer.lock().await;
            if writer.closed {
                return Ok(0);
            }
            writer.closed = true;
            self.sessions
                .remove_if(&key.session_id, |_, open| Arc::ptr_eq(open, &handle));
            writer.memory.get_history()
        };
        if !persist {
            return Ok(0);
        }

        for event in &history {
            self.persist_event(&key.session_id, handle.domain, "session", event)
                .await?;
        }
        tracing::info!(persisted = history.len(), "Session persisted to long-term memory");
        Ok(history.len())
    }

    pub fn get_preferences(&self, user_id: &str) -> UserPreferences {
        self.read_preferences(user_id).0
    }

    /// Store preferences; sessions opened afterwards pick them up.
    pub fn set_preferences(&self, user_id: &str, preferences: &UserPreferences) -> Result<()> {
        preferences.validate()?;
        self.preferences.set(user_id, preferences)
    }
}

fn message_kind(domain: Domain) -> EventKind {
    match domain {
        Domain::General => EventKind::Message,
        other => EventKind::Domain(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockStep};
    use crate::memory::preferences::{AGGRESSIVENESS_KEY, CONDENSER_KEY};
    use serde_json::json;

    fn key(session: &str) -> SessionKey {
        SessionKey::new(session, "analyst")
    }

    fn manager(budget: usize) -> MemoryManager {
        MemoryManager::in_memory(
            MemoryConfig::default().with_budget(Budget::MaxEvents(budget)),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_session_resolves_strategy() {
        let manager = manager(10);
        let info = manager.open_session(&key("s1"), Some(Domain::Lbo)).unwrap();
        assert_eq!(info.strategy, CondenserStrategy::Domain);
        assert_eq!(info.condenser, "domain");
        assert_eq!(info.domain, Domain::Lbo);

        let again = manager.open_session(&key("s1"), Some(Domain::Debt)).unwrap();
        assert_eq!(again.domain, Domain::Lbo);
    }

    #[tokio::test]
    async fn test_llm_preference_without_client_uses_recent() {
        let manager = manager(10);
        let mut prefs = UserPreferences::new();
        prefs.set(CONDENSER_KEY, "summarizing");
        manager.set_preferences("analyst", &prefs).unwrap();

        let info = manager.open_session(&key("s1"), Some(Domain::Lbo)).unwrap();
        assert_eq!(info.strategy, CondenserStrategy::Recent);
    }

    #[tokio::test]
    async fn test_llm_preference_with_client() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::repeating(
            "mock",
            MockStep::text("summary"),
        ));
        let manager = MemoryManager::in_memory(MemoryConfig::default(), Some(llm)).unwrap();
        let mut prefs = UserPreferences::new();
        prefs.set(CONDENSER_KEY, "financial_summarizing");
        prefs.set(AGGRESSIVENESS_KEY, "aggressive");
        manager.set_preferences("analyst", &prefs).unwrap();

        let info = manager.open_session(&key("s1"), Some(Domain::Debt)).unwrap();
        assert_eq!(info.strategy, CondenserStrategy::FinancialSummarizing);
        assert_eq!(info.condenser, "resilient(financial_summarizing)");
    }

    #[tokio::test]
    async fn test_default_domain_preference() {
        let manager = manager(10);
        let mut prefs = UserPreferences::new();
        prefs.set("default_domain", "lending");
        manager.set_preferences("analyst", &prefs).unwrap();
        let info = manager.open_session(&key("s1"), None).unwrap();
        assert_eq!(info.domain, Domain::Lending);
    }

    #[tokio::test]
    async fn test_invalid_preferences_rejected() {
        let manager = manager(10);
        let mut prefs = UserPreferences::new();
        prefs.set(AGGRESSIVENESS_KEY, "reckless");
        assert!(manager.set_preferences("analyst", &prefs).is_err());
        assert!(manager.get_preferences("analyst").is_empty());
    }

    #[tokio::test]
    async fn test_domain_message_validation_leaves_log_unchanged() {
        let manager = manager(10);
        let k = key("s1");
        manager.add_user_message(&k, "hello", Domain::Lbo).await.unwrap();

        let err = manager
            .add_domain_message(
                &k,
                Role::User,
                "bad",
                Domain::Lbo,
                BTreeMap::from([("ltv".to_string(), json!(0.7))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::MalformedEvent(_)));
        assert_eq!(manager.history(&k).len(), 1);
    }

    #[tokio::test]
    async fn test_session_belongs_to_user() {
        let manager = manager(10);
        manager.open_session(&key("s1"), None).unwrap();
        let intruder = SessionKey::new("s1", "someone-else");
        assert!(manager.add_user_message(&intruder, "hi", Domain::General).await.is_err());
    }

    #[tokio::test]
    async fn test_offloaded_events_become_searchable() {
        let config = MemoryConfig::default()
            .with_budget(Budget::MaxEvents(4))
            .with_strategy(Domain::Debt, CondenserStrategy::Recent);
        let manager = MemoryManager::in_memory(config, None).unwrap();
        let k = key("s1");

        manager
            .add_user_message(&k, "The revolver carries a commitment fee of 35bps", Domain::Debt)
            .await
            .unwrap();
        for i in 0..4 {
            manager
                .add_assistant_message(&k, &format!("noted item {i}"), Domain::Debt)
                .await
                .unwrap();
        }

        assert!(manager.history(&k).len() <= 4);
        let hits = manager
            .search_knowledge("revolver commitment fee", Domain::Debt, 1)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.entry_type, "offload");
        assert_eq!(hits[0].metadata.session_id.as_deref(), Some("s1"));
        assert!(hits[0].text.contains("commitment fee"));
    }

    #[tokio::test]
    async fn test_end_session_persists_history() {
        let manager = manager(10);
        let k = key("s1");
        manager.add_user_message(&k, "Lending case: 12m term loan", Domain::Lending).await.unwrap();
        manager.add_assistant_message(&k, "Modelled at SOFR + 450", Domain::Lending).await.unwrap();

        assert_eq!(manager.end_session(&k, true).await.unwrap(), 2);
        assert!(manager.history(&k).is_empty());
        assert!(manager.session_info(&k).is_none());
        assert_eq!(manager.end_session(&k, true).await.unwrap(), 0);

        let hits = manager.search_knowledge("term loan", Domain::Lending, 5).await;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata.entry_type == "session"));
    }

    #[tokio::test]
    async fn test_only_owner_can_end_or_condense() {
        let manager = manager(10);
        let k = key("s1");
        manager.add_user_message(&k, "Term sheet signed", Domain::Lending).await.unwrap();

        let intruder = SessionKey::new("s1", "someone-else");
        assert!(matches!(
            manager.end_session(&intruder, true).await,
            Err(MemoryError::MalformedEvent(_))
        ));
        assert!(manager.condense_session(&intruder).await.is_err());
        assert_eq!(manager.history(&k).len(), 1);
        assert!(manager.search_knowledge("term sheet", Domain::Lending, 5).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_append_queued_behind_end_session_reopens() {
        let manager = Arc::new(manager(10));
        let k = key("s1");
        manager.add_user_message(&k, "Senior tranche sized", Domain::Debt).await.unwrap();

        let handle = manager.session(&k, None).unwrap();
        let guard = handle.writer.lock().await;

        let ending = {
            let manager = manager.clone();
            let k = k.clone();
            tokio::spawn(async move { manager.end_session(&k, true).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let appending = {
            let manager = manager.clone();
            let k = k.clone();
            tokio::spawn(async move {
                manager.add_user_message(&k, "Mezzanine tranche sized", Domain::Debt).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);

        assert_eq!(ending.await.unwrap().unwrap(), 1);
        let outcome = appending.await.unwrap().unwrap();

        let history = manager.history(&k);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), outcome.event_id);
        assert!(!Arc::ptr_eq(&handle, &manager.session(&k, None).unwrap()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_acknowledged_appends_survive_racing_end_session() {
        let manager = Arc::new(manager(1000));
        let k = key("race");
        manager.open_session(&k, Some(Domain::Lbo)).unwrap();

        let mut writers = Vec::new();
        for w in 0..4 {
            let manager = manager.clone();
            let k = k.clone();
            writers.push(tokio::spawn(async move {
                let mut acknowledged = Vec::new();
                for i in 0..25 {
                    let text = format!("writer {w} turn {i}");
                    if let Ok(outcome) = manager.add_user_message(&k, &text, Domain::Lbo).await {
                        acknowledged.push(outcome.event_id);
                    }
                    tokio::task::yield_now().await;
                }
                acknowledged
            }));
        }
        tokio::task::yield_now().await;
        let persisted_count = manager.end_session(&k, true).await.unwrap();

        let mut acknowledged = Vec::new();
        for writer in writers {
            acknowledged.extend(writer.await.unwrap());
        }
        assert_eq!(acknowledged.len(), 100);

        let mut accounted: std::collections::HashSet<String> = manager
            .search_knowledge("writer turn", Domain::Lbo, 1000)
            .await
            .into_iter()
            .filter(|entry| entry.metadata.entry_type == "session")
            .filter_map(|entry| entry.metadata.extra.get("event_id").cloned())
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect();
        assert_eq!(accounted.len(), persisted_count);
        accounted.extend(manager.history(&k).iter().map(|e| e.id().to_string()));

        for id in acknowledged {
            assert!(accounted.contains(&id.to_string()), "event {id} was lost");
        }
    }

    #[tokio::test]
    async fn test_get_context_for_unknown_session() {
        let manager = manager(10);
        let bundle = manager.get_context(&key("nope"), "anything", Domain::Lbo, None).await;
        assert!(bundle.history.is_empty());
        assert!(bundle.retrieved.is_empty());
        assert!(!bundle.retrieval_degraded);
    }

    #[tokio::test]
    async fn test_condense_session_unknown_is_none() {
        let manager = manager(10);
        assert!(manager.condense_session(&key("nope")).await.unwrap().is_none());
    }
}
