//! User preference storage - one JSON document per user id.
//!
//! # Tables
//!
//! - `user_preferences`: user_id -> preference document bytes

use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use std::sync::Arc;

const PREFERENCE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("user_preferences");

/// Per-user preference documents with byte-level API.
#[derive(Debug, Clone)]
pub struct PreferenceStorage {
    db: Arc<Database>,
}

impl PreferenceStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PREFERENCE_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Replace the whole document for `user_id`.
    pub fn put_raw(&self, user_id: &str, document: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        write_txn
            .open_table(PREFERENCE_TABLE)?
            .insert(user_id, document)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_raw(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PREFERENCE_TABLE)?;
        Ok(table.get(user_id)?.map(|document| document.value().to_vec()))
    }

    /// Forget a user's preferences; true if a document existed.
    pub fn delete(&self, user_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = write_txn
            .open_table(PREFERENCE_TABLE)?
            .remove(user_id)?
            .is_some();
        write_txn.commit()?;
        Ok(existed)
    }

    /// Number of users with stored preferences.
    pub fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PREFERENCE_TABLE)?;
        Ok(table.len()? as usize)
    }
}
