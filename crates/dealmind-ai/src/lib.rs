//! Dealmind AI - tiered conversational memory for financial modeling
//!
//! This crate provides:
//! - Budgeted per-session event logs with pluggable condensation
//! - Domain-aware summaries that keep deal terms verbatim
//! - Long-term knowledge memory with similarity search
//! - LLM and embedding client abstractions (OpenAI, offline, mock)
//! - A completion adapter that answers with retrieved context

pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod memory;
pub mod rag;

// Re-export commonly used types
pub use config::MemoryConfig;
pub use embedding::{
    CachedEmbedding, EmbeddingCache, EmbeddingConfig, EmbeddingProvider, HashingEmbedding,
    OpenAIEmbedding,
};
pub use error::{MemoryError, Result};
pub use llm::{
    CompletionRequest, CompletionResponse, LlmClient, Message, MockLlmClient, MockStep,
    OpenAIClient, Role,
};
pub use memory::{
    Budget, ContextBundle, CondenserStrategy, Domain, EntryId, EntryMetadata, Event, EventId,
    EventKind, EventPayload, LongTermMemory, MemoryEntry, MemoryManager, SessionInfo, SessionKey,
    UserPreferences,
};
pub use rag::RagCompletionAdapter;
