//! # raft-core
//!
//! why: implement the core raft consensus algorithm in pure, portable rust
//! relations: driven by raft-node's runner, persisted through raft-storage
//! what: state machine, election logic, log management, message types

pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod node;

/// Identifier of a cluster member
pub type NodeId = u64;

pub use config::RaftConfig;
pub use error::RaftError;
pub use log::{Log, LogEntry, LogIndex, Term, NO_INDEX};
pub use message::{
    AppendEntriesRequest, AppendEntriesResponse, AppendProgress, RequestVoteRequest,
    RequestVoteResponse,
};
pub use node::{NodeState, NodeStatus, RaftNode};
