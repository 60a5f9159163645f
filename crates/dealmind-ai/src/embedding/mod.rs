//! Embedding providers and utilities.

mod cache;
mod hashing;
mod openai;
mod provider;

pub use cache::{CachedEmbedding, EmbeddingCache};
pub use hashing::{DEFAULT_HASHING_DIMENSION, HashingEmbedding};
pub use openai::OpenAIEmbedding;
pub use provider::{EmbeddingConfig, EmbeddingProvider};
