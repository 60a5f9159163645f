//! Segment summarizers used by rolling condensers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{MemoryError, Result};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::memory::domain::Domain;
use crate::memory::event::{Event, PreservedField, render_value, truncate_at_char_boundary};

pub const SUMMARY_PROMPT: &str = include_str!("../templates/summary_prompt.md");
pub const FINANCIAL_SUMMARY_PROMPT: &str = include_str!("../templates/financial_summary_prompt.md");

const LINE_PREVIEW_CHARS: usize = 160;

/// Input handed to a [`SegmentSummarizer`].
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    /// Text of the summary being replaced, if any.
    pub previous: Option<&'a str>,
    /// Raw events consumed by this condensation, oldest first.
    pub events: &'a [Event],
    pub domain: Option<Domain>,
    /// Must-preserve values already extracted by the condenser.
    pub preserved: &'a [PreservedField],
    pub max_chars: usize,
}

/// Turns a consumed segment into summary text.
#[async_trait]
pub trait SegmentSummarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String>;
}

/// Deterministic summarizer: a header plus one clipped line per event.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn preview(event: &Event) -> String {
        let line = event.render_line();
        if line.chars().count() <= LINE_PREVIEW_CHARS {
            return line;
        }
        let clipped: String = line.chars().take(LINE_PREVIEW_CHARS).collect();
        format!("{clipped}...")
    }
}

#[async_trait]
impl SegmentSummarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String> {
        let mut text = format!("Condensed {} earlier events.", request.events.len());
        if let Some(domain) = request.domain {
            text.push_str(&format!(" Domain: {}.", domain.label()));
        }
        if let Some(previous) = request.previous.filter(|p| !p.trim().is_empty()) {
            text.push_str("\nPrevious summary: ");
            text.push_str(previous.trim());
        }
        for event in request.events {
            text.push_str("\n- ");
            text.push_str(&Self::preview(event));
        }
        Ok(truncate_at_char_boundary(&text, request.max_chars))
    }
}

/// LLM-backed summarizer with a prompt template.
///
/// The template may use `{max_chars}`, `{domain_label}` and
/// `{preserved_fields}` placeholders.
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
    template: String,
    name: String,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            template: SUMMARY_PROMPT.to_string(),
            name: "llm".to_string(),
        }
    }

    /// Summarizer whose prompt lists extracted deal terms first.
    pub fn financial(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            template: FINANCIAL_SUMMARY_PROMPT.to_string(),
            name: "llm-financial".to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn render_prompt(&self, request: &SummaryRequest<'_>) -> String {
        let domain = request.domain.unwrap_or_default();
        let preserved = if request.preserved.is_empty() {
            "(none)".to_string()
        } else {
            request
                .preserved
                .iter()
                .map(|field| format!("- {}: {}", field.key, render_value(&field.value)))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let instructions = self
            .template
            .replace("{max_chars}", &request.max_chars.to_string())
            .replace("{domain_label}", domain.label())
            .replace("{preserved_fields}", &preserved);

        let mut conversation = String::new();
        if let Some(previous) = request.previous {
            conversation.push_str("## Previous Summary\n\n");
            conversation.push_str(previous);
            conversation.push_str("\n\n");
        }
        conversation.push_str("## Conversation to Summarize\n\n");
        for event in request.events {
            // Extracted terms are listed above; only the remainder goes here.
            let line = event.render_line_without(|key| {
                request
                    .preserved
                    .iter()
                    .any(|field| field.source_event_id == event.id() && field.key == key)
            });
            conversation.push_str(&line);
            conversation.push('\n');
        }

        format!("{}\n\n---\n\n{}", instructions, conversation)
    }
}

#[async_trait]
impl SegmentSummarizer for LlmSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String> {
        let prompt = self.render_prompt(&request);
        let completion = CompletionRequest::new(vec![Message::user(prompt)])
            .with_temperature(0.0)
            .with_max_tokens((request.max_chars / 3).max(64) as u32);

        let response = self.llm.complete(completion).await?;
        let Some(text) = response.text() else {
            return Err(MemoryError::CondensationFailure(format!(
                "{} returned an empty summary",
                self.llm.model()
            )));
        };
        Ok(truncate_at_char_boundary(text, request.max_chars))
    }
}
