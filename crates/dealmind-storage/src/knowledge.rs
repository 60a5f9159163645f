//! Knowledge storage - byte-level API for long-term memory entries.
//!
//! Stores embedded text chunks grouped into namespaces (one per financial
//! domain). Entry payloads are opaque bytes; the engine crate decides their
//! format. Every write touches all tables inside a single redb write
//! transaction, so an entry is either fully stored or absent.
//!
//! # Tables
//!
//! - `knowledge_entries`: entry_id -> entry_data
//! - `knowledge_vectors`: entry_id -> encoded [`VectorRecord`]
//! - `knowledge_namespace_index`: namespace:entry_id -> entry_id

use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

use crate::vector::{ScoredId, VectorRecord, cosine_distance, rank_nearest};

const ENTRY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("knowledge_entries");
const VECTOR_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("knowledge_vectors");
/// Index: namespace:entry_id -> entry_id
const NAMESPACE_INDEX_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("knowledge_namespace_index");

/// Configuration for knowledge storage.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Vector dimension every entry must match
    pub dimension: usize,
}

/// Search hit returned by [`KnowledgeStorage::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeHit {
    pub entry_id: String,
    pub distance: f32,
    pub data: Vec<u8>,
}

/// Low-level knowledge storage with byte-level API
#[derive(Clone)]
pub struct KnowledgeStorage {
    db: Arc<Database>,
    config: KnowledgeConfig,
}

impl KnowledgeStorage {
    /// Create a new KnowledgeStorage instance
    pub fn new(db: Arc<Database>, config: KnowledgeConfig) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(ENTRY_TABLE)?;
        write_txn.open_table(VECTOR_TABLE)?;
        write_txn.open_table(NAMESPACE_INDEX_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db, config })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Store an entry, its vector and its namespace index atomically.
    pub fn put_entry_raw(
        &self,
        entry_id: &str,
        namespace: &str,
        vector: &[f32],
        created_at: i64,
        data: &[u8],
    ) -> Result<()> {
        self.check_dimension(vector.len())?;

        let record = VectorRecord {
            namespace: namespace.to_string(),
            vector: vector.to_vec(),
            created_at,
        };
        let encoded = record.encode()?;

        let write_txn = self.db.begin_write()?;
        {
            let mut entry_table = write_txn.open_table(ENTRY_TABLE)?;
            entry_table.insert(entry_id, data)?;

            let mut vector_table = write_txn.open_table(VECTOR_TABLE)?;
            vector_table.insert(entry_id, encoded.as_slice())?;

            let mut namespace_index = write_txn.open_table(NAMESPACE_INDEX_TABLE)?;
            let index_key = format!("{}:{}", namespace, entry_id);
            namespace_index.insert(index_key.as_str(), entry_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get raw entry data by ID
    pub fn get_entry_raw(&self, entry_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRY_TABLE)?;

        if let Some(value) = table.get(entry_id)? {
            Ok(Some(value.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Delete an entry with its vector and index rows. Returns true if it existed.
    pub fn delete_entry(&self, entry_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut vector_table = write_txn.open_table(VECTOR_TABLE)?;
            let namespace = match vector_table.remove(entry_id)? {
                Some(value) => Some(VectorRecord::decode(value.value())?.namespace),
                None => None,
            };

            let mut entry_table = write_txn.open_table(ENTRY_TABLE)?;
            let existed = entry_table.remove(entry_id)?.is_some();

            if let Some(namespace) = namespace {
                let mut namespace_index = write_txn.open_table(NAMESPACE_INDEX_TABLE)?;
                let index_key = format!("{}:{}", namespace, entry_id);
                namespace_index.remove(index_key.as_str())?;
            }

            existed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Exact nearest-neighbour search inside one namespace.
    ///
    /// Results are ordered by ascending cosine distance, newest entry first
    /// on equal distance.
    pub fn search(&self, namespace: &str, query: &[f32], top_k: usize) -> Result<Vec<KnowledgeHit>> {
        self.check_dimension(query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let namespace_index = read_txn.open_table(NAMESPACE_INDEX_TABLE)?;
        let vector_table = read_txn.open_table(VECTOR_TABLE)?;
        let entry_table = read_txn.open_table(ENTRY_TABLE)?;

        let (start, end) = namespace_range(namespace);
        let mut candidates = Vec::new();

        for item in namespace_index.range(start.as_str()..end.as_str())? {
            let (_, value) = item?;
            let entry_id = value.value();
            let Some(raw) = vector_table.get(entry_id)? else {
                continue;
            };
            let record = VectorRecord::decode(raw.value())?;
            candidates.push(ScoredId {
                id: entry_id.to_string(),
                distance: cosine_distance(query, &record.vector),
                created_at: record.created_at,
            });
        }

        tracing::debug!(namespace, candidates = candidates.len(), "Scanned knowledge namespace");

        let mut hits = Vec::new();
        for scored in rank_nearest(candidates, top_k) {
            if let Some(data) = entry_table.get(scored.id.as_str())? {
                hits.push(KnowledgeHit {
                    entry_id: scored.id,
                    distance: scored.distance,
                    data: data.value().to_vec(),
                });
            }
        }

        Ok(hits)
    }

    /// Count entries in a namespace
    pub fn count_in_namespace(&self, namespace: &str) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let namespace_index = read_txn.open_table(NAMESPACE_INDEX_TABLE)?;

        let (start, end) = namespace_range(namespace);
        let mut count = 0usize;
        for item in namespace_index.range(start.as_str()..end.as_str())? {
            item?;
            count += 1;
        }

        Ok(count)
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len != self.config.dimension {
            anyhow::bail!(
                "Vector dimension mismatch: expected {}, got {}",
                self.config.dimension,
                len
            );
        }
        Ok(())
    }
}

/// Index key bounds covering exactly `namespace:*`.
///
/// `;` is the byte after `:`, so the exclusive end stops before any other
/// namespace, including ones that extend this name (`lbo` vs `lbo2`).
fn namespace_range(namespace: &str) -> (String, String) {
    (format!("{namespace}:"), format!("{namespace};"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_storage(dim: usize) -> KnowledgeStorage {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        KnowledgeStorage::new(db, KnowledgeConfig { dimension: dim }).unwrap()
    }

    #[test]
    fn test_put_and_get_entry() {
        let storage = create_test_storage(3);
        storage
            .put_entry_raw("entry-1", "lbo", &[1.0, 0.0, 0.0], 1, b"senior debt")
            .unwrap();

        let data = storage.get_entry_raw("entry-1").unwrap();
        assert_eq!(data.as_deref(), Some(b"senior debt".as_slice()));
        assert!(storage.get_entry_raw("missing").unwrap().is_none());
    }

    #[test]
    fn test_search_is_namespaced() {
        let storage = create_test_storage(3);
        storage
            .put_entry_raw("lbo-1", "lbo", &[1.0, 0.0, 0.0], 1, b"lbo")
            .unwrap();
        storage
            .put_entry_raw("ma-1", "ma", &[1.0, 0.0, 0.0], 2, b"ma")
            .unwrap();

        let hits = storage.search("lbo", &[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry_id, "lbo-1");
        assert_eq!(storage.count_in_namespace("ma").unwrap(), 1);
    }

    #[test]
    fn test_namespace_scan_ignores_neighbouring_names() {
        let storage = create_test_storage(2);
        storage.put_entry_raw("a", "debt", &[1.0, 0.0], 1, b"a").unwrap();
        storage.put_entry_raw("b", "debt2", &[1.0, 0.0], 2, b"b").unwrap();
        storage.put_entry_raw("c", "deb", &[1.0, 0.0], 3, b"c").unwrap();
        storage.put_entry_raw("d", "debt", &[0.0, 1.0], 4, b"d").unwrap();

        assert_eq!(storage.count_in_namespace("debt").unwrap(), 2);
        assert_eq!(storage.count_in_namespace("deb").unwrap(), 1);
        let hits = storage.search("debt", &[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let storage = create_test_storage(2);
        storage.put_entry_raw("far", "debt", &[0.0, 1.0], 1, b"far").unwrap();
        storage.put_entry_raw("near", "debt", &[1.0, 0.1], 2, b"near").unwrap();
        storage.put_entry_raw("exact", "debt", &[1.0, 0.0], 3, b"exact").unwrap();

        let hits = storage.search("debt", &[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        assert!(storage.search("debt", &[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_validation() {
        let storage = create_test_storage(4);
        assert!(
            storage
                .put_entry_raw("entry-1", "lbo", &[1.0, 0.0], 1, b"x")
                .is_err()
        );
        assert!(storage.search("lbo", &[1.0], 1).is_err());
        assert_eq!(storage.count_in_namespace("lbo").unwrap(), 0);
    }

    #[test]
    fn test_delete_entry() {
        let storage = create_test_storage(2);
        storage.put_entry_raw("entry-1", "lending", &[1.0, 0.0], 1, b"x").unwrap();

        assert!(storage.delete_entry("entry-1").unwrap());
        assert!(!storage.delete_entry("entry-1").unwrap());
        assert!(storage.get_entry_raw("entry-1").unwrap().is_none());
        assert_eq!(storage.count_in_namespace("lending").unwrap(), 0);
        assert!(storage.search("lending", &[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("knowledge.db");
        {
            let db = Arc::new(Database::create(&db_path).unwrap());
            let storage = KnowledgeStorage::new(db, KnowledgeConfig { dimension: 2 }).unwrap();
            storage.put_entry_raw("entry-1", "lbo", &[1.0, 0.0], 1, b"kept").unwrap();
        }

        let db = Arc::new(Database::create(&db_path).unwrap());
        let storage = KnowledgeStorage::new(db, KnowledgeConfig { dimension: 2 }).unwrap();
        let hits = storage.search("lbo", &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data, b"kept");
    }
}
