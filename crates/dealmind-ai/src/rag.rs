//! Completion adapter that answers through the memory manager.

use std::sync::Arc;

use crate::error::{MemoryError, Result};
use crate::llm::{CompletionRequest, LlmClient};
use crate::memory::{Domain, MemoryManager, SessionKey};

/// Wraps an [`LlmClient`] so every turn is recorded in memory and every
/// request carries the session's condensed history and retrieved knowledge.
pub struct RagCompletionAdapter {
    manager: Arc<MemoryManager>,
    llm: Arc<dyn LlmClient>,
    k: Option<usize>,
    temperature: Option<f32>,
}

impl RagCompletionAdapter {
    pub fn new(manager: Arc<MemoryManager>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            manager,
            llm,
            k: None,
            temperature: None,
        }
    }

    /// Knowledge entries per request; defaults to the configured `retrieval_k`.
    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// Record `user_text`, ask the model with the assembled context and
    /// record its reply. Completion errors are returned as-is.
    #[tracing::instrument(skip(self, user_text), fields(session_id = %key.session_id, model = self.llm.model()))]
    pub async fn complete(&self, key: &SessionKey, domain: Domain, user_text: &str) -> Result<String> {
        self.manager.add_user_message(key, user_text, domain).await?;

        let bundle = self.manager.get_context(key, user_text, domain, self.k).await;
        let mut request = CompletionRequest::new(bundle.to_messages());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.llm.complete(request).await?;
        let reply = response
            .text()
            .map(str::to_string)
            .ok_or_else(|| MemoryError::Llm("model returned an empty reply".to_string()))?;

        self.manager.add_assistant_message(key, &reply, domain).await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::llm::{MockLlmClient, MockStep, Role};
    use crate::memory::EntryMetadata;

    fn manager() -> Arc<MemoryManager> {
        Arc::new(MemoryManager::in_memory(MemoryConfig::default(), None).unwrap())
    }

    #[tokio::test]
    async fn test_complete_records_both_turns_with_context() {
        let manager = manager();
        manager
            .add_knowledge_document(
                "Senior debt typically 4–6x EBITDA",
                EntryMetadata::document(Domain::Lbo),
                Domain::Lbo,
            )
            .await
            .unwrap();

        let llm = MockLlmClient::from_steps("mock", vec![MockStep::text("Use 5x senior debt.")]);
        let adapter = RagCompletionAdapter::new(manager.clone(), Arc::new(llm.clone()))
            .with_retrieval_k(1);
        let key = SessionKey::new("deal-1", "analyst");

        let reply = adapter
            .complete(&key, Domain::Lbo, "How much senior debt can we raise?")
            .await
            .unwrap();
        assert_eq!(reply, "Use 5x senior debt.");

        let history = manager.history(&key);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role(), Role::User);
        assert_eq!(history[1].content(), "Use 5x senior debt.");

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Senior debt typically 4–6x EBITDA"));
        assert_eq!(
            messages.last().unwrap().content,
            "How much senior debt can we raise?"
        );
    }

    #[tokio::test]
    async fn test_llm_error_is_surfaced() {
        let manager = manager();
        let adapter = RagCompletionAdapter::new(manager.clone(), Arc::new(MockLlmClient::failing("mock")));
        let key = SessionKey::new("deal-2", "analyst");

        assert!(adapter.complete(&key, Domain::Debt, "Price the revolver").await.is_err());
        // The user turn is recorded before the model is called.
        assert_eq!(manager.history(&key).len(), 1);
    }
}
