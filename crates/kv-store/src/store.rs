//! # store
//!
//! why: the replicated state every node converges on
//! relations: written only by machine.rs (applied entries), read directly by gateway.rs
//! what: Store, StoreError

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("key cannot be empty")]
    EmptyKey,

    #[error("key not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    /// bumped on every overwrite, starts at 1
    version: u64,
}

/// Thread-safe key -> value map
#[derive(Debug, Default)]
pub struct Store {
    data: RwLock<HashMap<String, Slot>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite; returns the key's new version
    pub fn set(&self, key: &str, value: Vec<u8>) -> Result<u64, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let mut data = self.write();
        let version = data.get(key).map_or(1, |slot| slot.version + 1);
        data.insert(key.to_string(), Slot { value, version });
        Ok(version)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.read().get(key).map(|slot| slot.value.clone())
    }

    pub fn version(&self, key: &str) -> Option<u64> {
        self.read().get(key).map(|slot| slot.version)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.write().remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    /// sorted, for stable output
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}
