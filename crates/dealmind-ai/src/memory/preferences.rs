//! Per-user preferences read by the memory manager.

use dashmap::DashMap;
use dealmind_storage::PreferenceStorage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::condenser::{Aggressiveness, CondenserStrategy};
use super::domain::Domain;
use crate::error::{MemoryError, Result};

pub const AGGRESSIVENESS_KEY: &str = "aggressiveness";
pub const DEFAULT_DOMAIN_KEY: &str = "default_domain";
pub const CONDENSER_KEY: &str = "condenser";

/// Free-form preference document with typed accessors for known keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserPreferences(BTreeMap<String, Value>);

impl UserPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Overlay `other` on top of these preferences.
    pub fn merge(&mut self, other: UserPreferences) {
        self.0.extend(other.0);
    }

    pub fn aggressiveness(&self) -> Option<Aggressiveness> {
        self.str_value(AGGRESSIVENESS_KEY)?.parse().ok()
    }

    pub fn default_domain(&self) -> Option<Domain> {
        self.str_value(DEFAULT_DOMAIN_KEY)?.parse().ok()
    }

    pub fn condenser(&self) -> Option<CondenserStrategy> {
        self.str_value(CONDENSER_KEY)?.parse().ok()
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// Reject known keys holding values the engine cannot interpret.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, fn(&str) -> bool); 3] = [
            (AGGRESSIVENESS_KEY, |v| v.parse::<Aggressiveness>().is_ok()),
            (DEFAULT_DOMAIN_KEY, |v| v.parse::<Domain>().is_ok()),
            (CONDENSER_KEY, |v| v.parse::<CondenserStrategy>().is_ok()),
        ];
        for (key, valid) in checks {
            if let Some(value) = self.0.get(key) {
                let ok = value.as_str().is_some_and(valid);
                if !ok {
                    return Err(MemoryError::Config(format!(
                        "invalid value for preference '{key}': {value}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Read/write contract for preference persistence.
pub trait PreferenceStore: Send + Sync {
    /// Preferences for `user_id`; empty when none were saved.
    fn get(&self, user_id: &str) -> Result<UserPreferences>;

    fn set(&self, user_id: &str, preferences: &UserPreferences) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    entries: DashMap<String, UserPreferences>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn get(&self, user_id: &str) -> Result<UserPreferences> {
        Ok(self
            .entries
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    fn set(&self, user_id: &str, preferences: &UserPreferences) -> Result<()> {
        self.entries
            .insert(user_id.to_string(), preferences.clone());
        Ok(())
    }
}

/// Preferences persisted as JSON documents in redb.
pub struct RedbPreferenceStore {
    storage: PreferenceStorage,
}

impl RedbPreferenceStore {
    pub fn new(storage: PreferenceStorage) -> Self {
        Self { storage }
    }
}

impl PreferenceStore for RedbPreferenceStore {
    fn get(&self, user_id: &str) -> Result<UserPreferences> {
        let raw = self
            .storage
            .get_raw(user_id)
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))?;
        match raw {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(UserPreferences::default()),
        }
    }

    fn set(&self, user_id: &str, preferences: &UserPreferences) -> Result<()> {
        let bytes = serde_json::to_vec(preferences)?;
        self.storage
            .put_raw(user_id, &bytes)
            .map_err(|e| MemoryError::PersistenceFailure(e.to_string()))
    }
}
