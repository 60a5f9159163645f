use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::provider::EmbeddingProvider;

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

/// Bounded embedding cache keyed by `sha256(model:text)`.
///
/// Evicts in insertion order once `max_entries` is reached.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn cache_key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let key = Self::cache_key(text, model);
        self.inner.lock().entries.get(&key).cloned()
    }

    pub fn put(&self, text: &str, model: &str, embedding: Vec<f32>) {
        let key = Self::cache_key(text, model);
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), embedding).is_some() {
            return;
        }
        inner.order.push_back(key);
        while inner.order.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Provider wrapper that memoizes single-text embeddings.
///
/// Queries against long-term memory repeat often within a session (the same
/// user question is embedded for every context build), so the wrapper sits
/// in front of remote providers.
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_entries: usize) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(max_entries),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.inner.model_name();
        if let Some(hit) = self.cache.get(text, model) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.put(text, model, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
