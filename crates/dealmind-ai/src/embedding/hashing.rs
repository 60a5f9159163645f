//! Deterministic offline embedding provider.
//!
//! Feature-hashes word tokens into a fixed-width signed vector and
//! L2-normalizes it. Texts sharing vocabulary land close together under
//! cosine distance, which is enough for local runs and tests without an
//! embedding API.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::EmbeddingProvider;

pub const DEFAULT_HASHING_DIMENSION: usize = 256;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "to", "was", "with",
];

#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    model: String,
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model: format!("hashing-{dimension}"),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .map(|t| {
                // Fold simple plurals: "covenants" and "covenant" share a bucket.
                if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
                    t[..t.len() - 1].to_string()
                } else {
                    t
                }
            })
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(&self.normalize_text(text)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
