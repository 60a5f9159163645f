use anyhow::Result;
use async_trait::async_trait;

/// Settings of a remote embedding model.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// Texts sent per request
    pub batch_size: usize,
    pub timeout_secs: u64,
}

/// Text in, fixed-length vector out.
///
/// Long-term memory embeds documents and queries with the same provider, so
/// every vector it returns must have length [`EmbeddingProvider::dimension`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; one request at a time unless overridden.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;

    /// Collapse whitespace and strip control characters.
    fn normalize_text(&self, text: &str) -> String {
        text.split(|c: char| c.is_whitespace() || c.is_control())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
