//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{MemoryError, Result};
use crate::llm::client::{CompletionRequest, CompletionResponse, FinishReason, LlmClient, TokenUsage};
use crate::llm::retry::{LlmRetryConfig, response_to_error};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// OpenAI client
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry_config: LlmRetryConfig,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            retry_config: LlmRetryConfig::default(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, config: LlmRetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = OpenAIRequest {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        for attempt in 0..=self.retry_config.max_retries {
            let response = match self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    let error = MemoryError::Http(e);
                    if !error.is_retryable() || attempt == self.retry_config.max_retries {
                        return Err(error);
                    }
                    let delay = self.retry_config.delay_for(attempt + 1, None);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying OpenAI request after connection error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            if response.status().is_success() {
                let data: OpenAIResponse = response.json().await?;
                let choice = data
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| MemoryError::Llm("No response from OpenAI".to_string()))?;

                let finish_reason = match choice.finish_reason.as_deref() {
                    Some("stop") | None => FinishReason::Stop,
                    Some("length") => FinishReason::MaxTokens,
                    Some(_) => FinishReason::Error,
                };

                return Ok(CompletionResponse {
                    content: choice.message.content,
                    finish_reason,
                    usage: data.usage.map(|u| TokenUsage {
                        prompt_tokens: u.prompt_tokens,
                        completion_tokens: u.completion_tokens,
                        total_tokens: u.total_tokens,
                    }),
                });
            }

            let error = response_to_error(response, "OpenAI").await;
            if !error.is_retryable() || attempt == self.retry_config.max_retries {
                return Err(error);
            }
            let retry_after = match &error {
                MemoryError::LlmHttp {
                    retry_after_secs, ..
                } => *retry_after_secs,
                _ => None,
            };
            let delay = self.retry_config.delay_for(attempt + 1, retry_after);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying OpenAI request"
            );
            tokio::time::sleep(delay).await;
        }

        Err(MemoryError::Llm("OpenAI retries exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> LlmRetryConfig {
        LlmRetryConfig {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_complete_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Leverage is 5.0x."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new("test-key").with_base_url(server.uri());
        let response = client
            .complete(CompletionRequest::new(vec![Message::user("Leverage?")]))
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("Leverage is 5.0x."));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.unwrap().total_tokens, 17);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&server)
            .await;

        let client = OpenAIClient::new("test-key")
            .with_base_url(server.uri())
            .with_retry_config(fast_retry());
        let result = client
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;

        assert!(matches!(
            result,
            Err(MemoryError::LlmHttp { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new("wrong")
            .with_base_url(server.uri())
            .with_retry_config(fast_retry());
        let result = client
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;

        assert!(matches!(
            result,
            Err(MemoryError::LlmHttp { status: 401, .. })
        ));
    }
}
