//! # machine
//!
//! why: turn committed log entries into store mutations
//! relations: plugged into raft-node's apply pipeline; shares the Store with gateway.rs
//! what: KvStateMachine

use std::sync::Arc;

use raft_core::LogEntry;
use raft_node::{ApplyError, StateMachine};
use tracing::debug;

use crate::command::Command;
use crate::store::{Store, StoreError};

pub struct KvStateMachine {
    store: Arc<Store>,
}

impl KvStateMachine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl StateMachine for KvStateMachine {
    fn apply(&mut self, entry: &LogEntry) -> Result<(), ApplyError> {
        let command = Command::decode(&entry.command).map_err(|e| ApplyError::new(e.to_string()))?;
        match command {
            Command::Put { key, value } => {
                let version = self
                    .store
                    .set(&key, value.into_bytes())
                    .map_err(|e| ApplyError::new(e.to_string()))?;
                debug!(index = entry.index, %key, version, "put applied");
            }
            Command::Delete { key } => match self.store.delete(&key) {
                Ok(()) => debug!(index = entry.index, %key, "delete applied"),
                // raced with another delete; nothing left to do
                Err(StoreError::NotFound(_)) => debug!(index = entry.index, %key, "delete of missing key"),
                Err(e) => return Err(ApplyError::new(e.to_string())),
            },
        }
        Ok(())
    }
}
