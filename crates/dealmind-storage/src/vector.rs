//! Vector math and on-disk vector records.
//!
//! Knowledge namespaces stay small (one per financial domain, thousands of
//! chunks at most), so search is an exact cosine scan over the persisted
//! vectors rather than an approximate index. Exact ranking is what lets the
//! store promise "k > count returns everything, ordered by distance".

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Persisted form of one embedded entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub namespace: String,
    pub vector: Vec<f32>,
    /// Entry timestamp in milliseconds, used to break distance ties.
    pub created_at: i64,
}

impl VectorRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (record, _): (VectorRecord, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(record)
    }
}

/// Cosine distance in `[0, 2]`; lower is closer.
///
/// Zero vectors have no direction and are treated as maximally unrelated
/// (distance 1.0) instead of producing NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    1.0 - similarity.clamp(-1.0, 1.0)
}

/// A scored candidate produced by [`rank_nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub distance: f32,
    pub created_at: i64,
}

/// Order candidates by ascending distance, newest first on ties, and keep `k`.
pub fn rank_nearest(mut candidates: Vec<ScoredId>, k: usize) -> Vec<ScoredId> {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    candidates.truncate(k);
    candidates
}
