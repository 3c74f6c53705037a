//! # message
//!
//! why: define all raft rpc message types for node communication
//! relations: produced and consumed by node.rs, serialized by the raft-node transport
//! what: RequestVote and AppendEntries request/response pairs

use serde::{Deserialize, Serialize};

use crate::log::{LogEntry, LogIndex, Term};
use crate::NodeId;

/// Request a vote during leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: NodeId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

/// Response to a vote request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: NodeId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

impl AppendEntriesRequest {
    /// what the leader needs to remember about this request once it is sent
    pub fn progress(&self) -> AppendProgress {
        AppendProgress {
            term: self.term,
            prev_log_index: self.prev_log_index,
            entry_count: self.entries.len(),
        }
    }
}

/// Response to AppendEntries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
}

/// Summary of an in-flight AppendEntries, matched against its response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendProgress {
    /// leader term the request was sent in
    pub term: Term,
    pub prev_log_index: LogIndex,
    pub entry_count: usize,
}

impl AppendProgress {
    /// highest index the follower holds if the request succeeded
    pub fn last_sent_index(&self) -> LogIndex {
        self.prev_log_index + self.entry_count as LogIndex
    }
}
