//! Similarity index behind long-term memory.

use anyhow::Result;
use dealmind_storage::{KnowledgeStorage, ScoredId, cosine_distance, rank_nearest};
use parking_lot::RwLock;

/// One entry handed to [`VectorIndex::insert`].
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub namespace: String,
    pub vector: Vec<f32>,
    /// Milliseconds since the epoch; newer wins distance ties.
    pub created_at: i64,
    pub payload: Vec<u8>,
}

/// One query result, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub distance: f32,
    pub payload: Vec<u8>,
}

/// Store with insert and query-by-similarity, partitioned by namespace.
pub trait VectorIndex: Send + Sync {
    /// Store one record atomically.
    fn insert(&self, record: IndexRecord) -> Result<()>;

    /// Up to `k` records of `namespace` by ascending cosine distance.
    fn query(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<IndexHit>>;

    /// Remove a record. Returns true if it existed.
    fn delete(&self, id: &str) -> Result<bool>;
}

/// In-process index; every operation takes one lock.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<Vec<IndexRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn insert(&self, record: IndexRecord) -> Result<()> {
        let mut records = self.records.write();
        if let Some(first) = records.first()
            && first.vector.len() != record.vector.len()
        {
            anyhow::bail!(
                "Vector dimension mismatch: expected {}, got {}",
                first.vector.len(),
                record.vector.len()
            );
        }
        records.push(record);
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read();
        let candidates = records
            .iter()
            .filter(|r| r.namespace == namespace)
            .map(|r| ScoredId {
                id: r.id.clone(),
                distance: cosine_distance(vector, &r.vector),
                created_at: r.created_at,
            })
            .collect();

        Ok(rank_nearest(candidates, k)
            .into_iter()
            .filter_map(|scored| {
                records.iter().find(|r| r.id == scored.id).map(|r| IndexHit {
                    id: scored.id,
                    distance: scored.distance,
                    payload: r.payload.clone(),
                })
            })
            .collect())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }
}

impl VectorIndex for KnowledgeStorage {
    fn insert(&self, record: IndexRecord) -> Result<()> {
        self.put_entry_raw(
            &record.id,
            &record.namespace,
            &record.vector,
            record.created_at,
            &record.payload,
        )
    }

    fn query(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<IndexHit>> {
        Ok(self
            .search(namespace, vector, k)?
            .into_iter()
            .map(|hit| IndexHit {
                id: hit.entry_id,
                distance: hit.distance,
                payload: hit.data,
            })
            .collect())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        self.delete_entry(id)
    }
}
