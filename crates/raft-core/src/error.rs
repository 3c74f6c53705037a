//! # error
//!
//! why: the few ways a caller-facing raft operation can fail
//! relations: returned by node.rs proposals and config.rs validation
//! what: RaftError

use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaftError {
    /// proposals are only accepted by the leader
    #[error("node is not the leader (leader hint: {leader:?})")]
    NotLeader { leader: Option<NodeId> },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
