//! # config
//!
//! why: timing knobs for elections, heartbeats and rpc waits
//! relations: held by node.rs, filled in from the command line by raft-node
//! what: RaftConfig with defaults and validation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RaftError;

/// Timing configuration, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// lower bound of the randomized election timeout window
    pub election_timeout_min: u64,
    /// upper bound (exclusive) of the election timeout window
    pub election_timeout_max: u64,
    /// period of leader heartbeats / replication rounds
    pub heartbeat_interval: u64,
    /// bound on every outbound rpc
    pub rpc_timeout: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            rpc_timeout: 100,
        }
    }
}

impl RaftConfig {
    /// reject windows that would make elections impossible or flap
    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min == 0 {
            return Err(RaftError::InvalidConfig(
                "election_timeout_min must be positive".into(),
            ));
        }
        if self.election_timeout_max <= self.election_timeout_min {
            return Err(RaftError::InvalidConfig(format!(
                "election timeout window [{}, {}) is empty",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval == 0 || self.heartbeat_interval >= self.election_timeout_min {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat_interval {} must be in (0, election_timeout_min)",
                self.heartbeat_interval
            )));
        }
        if self.rpc_timeout == 0 {
            return Err(RaftError::InvalidConfig("rpc_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn rpc(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout)
    }
}
