//! # error
//!
//! why: runtime failures, kept apart from the protocol's normal rejections
//! relations: TransportError from transport/, NodeError from runner.rs and handle.rs
//! what: TransportError, NodeError, ConfigError

use std::io;
use std::time::Duration;

use raft_core::{NodeId, RaftError};
use thiserror::Error;

/// An outbound rpc that produced no usable response this round
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rpc timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer {0} is unreachable: {1}")]
    Unreachable(NodeId, String),

    #[error("no address known for peer {0}")]
    UnknownPeer(NodeId),

    #[error("peer answered with http status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Failures seen by callers of a running node
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Raft(#[from] RaftError),

    /// the proposing leader stepped down before the entry was applied;
    /// the entry may or may not commit later
    #[error("leadership lost before the entry was applied")]
    LeadershipLost,

    #[error("state machine rejected entry: {0}")]
    Apply(String),

    #[error("raft node has stopped")]
    Stopped,

    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),

    #[error("cannot listen on {0}: {1}")]
    Listen(String, #[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl NodeError {
    /// leader hint when the failure is a redirect
    pub fn leader_hint(&self) -> Option<NodeId> {
        match self {
            NodeError::Raft(RaftError::NotLeader { leader }) => *leader,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cluster address list is empty")]
    EmptyCluster,

    #[error("node id {0} is not part of the cluster (ids run 1..={1})")]
    UnknownNodeId(NodeId, usize),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error(transparent)]
    Raft(#[from] RaftError),
}
