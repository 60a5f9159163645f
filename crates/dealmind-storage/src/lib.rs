//! Dealmind Storage - Low-level persistence layer
//!
//! This crate provides the persistence layer for the Dealmind memory engine,
//! using redb as the embedded database. It exposes byte-level APIs so it does
//! not depend on the engine's event or metadata types.
//!
//! # Tables
//!
//! - `knowledge_entries` / `knowledge_vectors` / `knowledge_namespace_index` -
//!   long-term memory entries with their embeddings, grouped by namespace
//! - `user_preferences` - per-user preference documents

pub mod knowledge;
pub mod preferences;
pub mod vector;

use anyhow::Result;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

pub use knowledge::{KnowledgeConfig, KnowledgeHit, KnowledgeStorage};
pub use preferences::PreferenceStorage;
pub use vector::{ScoredId, VectorRecord, cosine_distance, rank_nearest};

/// Central storage manager that initializes all storage subsystems
pub struct Storage {
    db: Arc<Database>,
    pub knowledge: KnowledgeStorage,
    pub preferences: PreferenceStorage,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// Creates the database file if it doesn't exist and initializes all
    /// tables. `dimension` is the embedding width every knowledge entry must
    /// match.
    pub fn new(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let db = Arc::new(Database::create(path.as_ref())?);

        let knowledge = KnowledgeStorage::new(db.clone(), KnowledgeConfig { dimension })?;
        let preferences = PreferenceStorage::new(db.clone())?;

        Ok(Self {
            db,
            knowledge,
            preferences,
        })
    }

    /// Get a reference to the underlying database
    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }
}
