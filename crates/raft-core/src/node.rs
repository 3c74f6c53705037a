//! # node
//!
//! why: define the raft node state machine and state transitions
//! relations: uses message.rs for rpc types, log.rs for entry management, driven by raft-node
//! what: NodeState enum, RaftNode struct, election, replication and commit logic
//!
//! every method here is a synchronous transition over the node's own state.
//! nothing blocks and nothing talks to the network: handlers return the
//! response to send and whether the election timer should be reset, and the
//! leader side hands back requests for the caller to deliver.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RaftConfig;
use crate::error::RaftError;
use crate::log::{Log, LogEntry, LogIndex, Term, NO_INDEX};
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, AppendProgress, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::NodeId;

/// The three possible states a Raft node can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

/// Point-in-time view of a node, served to operators and the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub state: NodeState,
    pub term: Term,
    pub leader: Option<NodeId>,
    pub voted_for: Option<NodeId>,
    pub last_log_index: LogIndex,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
}

/// A single Raft node in the cluster
#[derive(Debug)]
pub struct RaftNode {
    /// Unique identifier for this node
    pub id: NodeId,
    /// Every member of the cluster, this node included
    pub cluster_nodes: Vec<NodeId>,
    pub config: RaftConfig,
    /// Current state (Follower, Candidate, or Leader)
    pub state: NodeState,
    /// Current term number
    pub current_term: Term,
    /// Node ID that received our vote in current term (if any)
    pub voted_for: Option<NodeId>,
    pub log: Log,
    /// Highest index known to be replicated on a majority
    pub commit_index: LogIndex,
    /// Highest index handed to the state machine
    pub last_applied: LogIndex,
    /// Last leader we accepted AppendEntries from in the current term
    pub leader_id: Option<NodeId>,
    /// Voters for us in the current election
    pub votes_received: Vec<NodeId>,
    /// Leader only: next index to send to each peer
    pub next_index: HashMap<NodeId, LogIndex>,
    /// Leader only: highest index known replicated on each peer
    pub match_index: HashMap<NodeId, LogIndex>,
    /// Lowest log index changed since the last `take_unpersisted_from`
    unpersisted_from: Option<LogIndex>,
}

impl RaftNode {
    /// Create a new Raft node in Follower state
    pub fn new(id: NodeId, cluster_nodes: Vec<NodeId>) -> Self {
        Self::with_config(id, cluster_nodes, RaftConfig::default())
    }

    pub fn with_config(id: NodeId, mut cluster_nodes: Vec<NodeId>, config: RaftConfig) -> Self {
        if !cluster_nodes.contains(&id) {
            cluster_nodes.push(id);
        }
        cluster_nodes.sort_unstable();
        cluster_nodes.dedup();
        Self {
            id,
            cluster_nodes,
            config,
            state: NodeState::Follower,
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            commit_index: NO_INDEX,
            last_applied: NO_INDEX,
            leader_id: None,
            votes_received: Vec::new(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            unpersisted_from: None,
        }
    }

    /// Load previously persisted term, vote and log (restart with a data dir)
    pub fn restore(&mut self, term: Term, voted_for: Option<NodeId>, entries: Vec<LogEntry>) {
        self.current_term = term;
        self.voted_for = voted_for;
        self.log = Log::from_entries(entries);
        self.unpersisted_from = None;
    }

    // -- cluster helpers --

    /// Every member except ourselves
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cluster_nodes.iter().copied().filter(move |&n| n != self.id)
    }

    /// floor(N/2) + 1
    pub fn quorum_size(&self) -> usize {
        self.cluster_nodes.len() / 2 + 1
    }

    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() >= self.quorum_size()
    }

    pub fn is_leader(&self) -> bool {
        self.state == NodeState::Leader
    }

    pub fn last_log_index(&self) -> LogIndex {
        self.log.last_index()
    }

    pub fn last_log_term(&self) -> Term {
        self.log.last_term()
    }

    pub fn get_entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.log.get(index)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            state: self.state,
            term: self.current_term,
            leader: self.leader_id,
            voted_for: self.voted_for,
            last_log_index: self.log.last_index(),
            commit_index: self.commit_index,
            last_applied: self.last_applied,
        }
    }

    // -- state transitions --

    /// Revert to follower, adopting `term` if it is newer
    ///
    /// the vote is only cleared when the term actually advances, so a
    /// candidate stepping down for a same-term leader keeps its self vote.
    pub fn become_follower(&mut self, term: Term) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        if self.state != NodeState::Follower {
            info!(node = self.id, term = self.current_term, from = ?self.state, "stepping down to follower");
        }
        self.state = NodeState::Follower;
        self.votes_received.clear();
        self.next_index.clear();
        self.match_index.clear();
    }

    fn become_leader(&mut self) {
        info!(node = self.id, term = self.current_term, "became leader");
        self.state = NodeState::Leader;
        self.leader_id = Some(self.id);
        self.votes_received.clear();
        let next = self.log.len();
        let peers: Vec<NodeId> = self.peers().collect();
        for peer in peers {
            self.next_index.insert(peer, next);
            self.match_index.insert(peer, NO_INDEX);
        }
    }

    // -- election --

    /// Election timer fired: start a new term and ask everyone for a vote
    ///
    /// a single-node cluster wins on the spot.
    pub fn start_election(&mut self) -> RequestVoteRequest {
        self.current_term += 1;
        self.state = NodeState::Candidate;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        self.votes_received = vec![self.id];
        self.next_index.clear();
        self.match_index.clear();
        info!(node = self.id, term = self.current_term, "starting election");

        if self.has_quorum() {
            self.become_leader();
        }

        RequestVoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        }
    }

    /// Count a vote reply for the election started in `election_term`
    ///
    /// returns true only on the reply that makes this node leader.
    pub fn handle_vote_response(
        &mut self,
        from: NodeId,
        election_term: Term,
        resp: &RequestVoteResponse,
    ) -> bool {
        if resp.term > self.current_term {
            self.become_follower(resp.term);
            return false;
        }
        if self.state != NodeState::Candidate
            || election_term != self.current_term
            || resp.term != self.current_term
        {
            // reply to an election we are no longer running
            return false;
        }
        if !resp.vote_granted || self.votes_received.contains(&from) {
            return false;
        }

        self.votes_received.push(from);
        debug!(node = self.id, peer = from, votes = self.votes_received.len(), "vote granted");
        if self.has_quorum() {
            self.become_leader();
            return true;
        }
        false
    }

    /// Decide on a RequestVote; the bool asks the caller to reset its election timer
    pub fn handle_request_vote(&mut self, req: &RequestVoteRequest) -> (RequestVoteResponse, bool) {
        if req.term < self.current_term {
            return (self.vote_reply(false), false);
        }
        if req.term > self.current_term {
            self.become_follower(req.term);
        }

        let free_to_vote = self.voted_for.map_or(true, |v| v == req.candidate_id);
        if free_to_vote && self.log.is_up_to_date(req.last_log_term, req.last_log_index) {
            self.voted_for = Some(req.candidate_id);
            debug!(node = self.id, candidate = req.candidate_id, term = req.term, "granting vote");
            return (self.vote_reply(true), true);
        }
        (self.vote_reply(false), false)
    }

    fn vote_reply(&self, vote_granted: bool) -> RequestVoteResponse {
        RequestVoteResponse {
            term: self.current_term,
            vote_granted,
        }
    }

    // -- replication, follower side --

    /// Apply an AppendEntries from a leader; the bool asks the caller to reset its election timer
    pub fn handle_append_entries(
        &mut self,
        req: AppendEntriesRequest,
    ) -> (AppendEntriesResponse, bool) {
        if req.term < self.current_term {
            return (self.append_reply(false), false);
        }
        if req.term > self.current_term || self.state != NodeState::Follower {
            self.become_follower(req.term);
        }
        self.leader_id = Some(req.leader_id);

        if !self.log.matches(req.prev_log_index, req.prev_log_term) {
            debug!(
                node = self.id,
                prev_log_index = req.prev_log_index,
                prev_log_term = req.prev_log_term,
                "log mismatch"
            );
            return (self.append_reply(false), true);
        }

        // entries must run contiguously from prev_log_index + 1
        let misnumbered = req
            .entries
            .iter()
            .zip(req.prev_log_index + 1..)
            .any(|(entry, expected)| entry.index != expected);
        if misnumbered {
            warn!(
                node = self.id,
                leader = req.leader_id,
                prev_log_index = req.prev_log_index,
                "rejecting append entries with misnumbered entries"
            );
            return (self.append_reply(false), true);
        }

        let last_new_index = req.prev_log_index + req.entries.len() as LogIndex;
        if let Some(changed) = self.log.merge(req.entries) {
            self.note_unpersisted(changed);
        }

        let new_commit = req
            .leader_commit
            .min(last_new_index)
            .min(self.log.last_index());
        if new_commit > self.commit_index {
            self.commit_index = new_commit;
        }

        (self.append_reply(true), true)
    }

    fn append_reply(&self, success: bool) -> AppendEntriesResponse {
        AppendEntriesResponse {
            term: self.current_term,
            success,
        }
    }

    // -- replication, leader side --

    /// Append a client command to the leader's log
    pub fn propose(&mut self, command: Vec<u8>) -> Result<LogEntry, RaftError> {
        if self.state != NodeState::Leader {
            return Err(RaftError::NotLeader {
                leader: self.leader_id,
            });
        }
        let entry = self.log.append(self.current_term, command).clone();
        self.note_unpersisted(entry.index);
        self.advance_commit_index();
        Ok(entry)
    }

    /// Build the next AppendEntries for `peer`, starting at its next index
    pub fn create_append_entries(&self, peer: NodeId) -> Option<AppendEntriesRequest> {
        if self.state != NodeState::Leader || peer == self.id {
            return None;
        }
        let next = self
            .next_index
            .get(&peer)
            .copied()
            .unwrap_or_else(|| self.log.len())
            .clamp(0, self.log.len());
        let prev_log_index = next - 1;
        Some(AppendEntriesRequest {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term: self.log.term_at(prev_log_index).unwrap_or(0),
            entries: self.log.entries_from(next),
            leader_commit: self.commit_index,
        })
    }

    /// Fold a peer's reply into next/match bookkeeping
    ///
    /// returns true when the commit index advanced.
    pub fn handle_append_entries_response(
        &mut self,
        from: NodeId,
        sent: AppendProgress,
        resp: &AppendEntriesResponse,
    ) -> bool {
        if resp.term > self.current_term {
            self.become_follower(resp.term);
            return false;
        }
        if self.state != NodeState::Leader || sent.term != self.current_term {
            return false;
        }

        if resp.success {
            let matched = self.match_index.entry(from).or_insert(NO_INDEX);
            *matched = (*matched).max(sent.last_sent_index());
            let next = *matched + 1;
            self.next_index.insert(from, next);
            return self.advance_commit_index();
        }

        // mismatch: back off by one, but only for the probe we are waiting on
        let log_len = self.log.len();
        let next = self.next_index.entry(from).or_insert(log_len);
        if sent.prev_log_index + 1 == *next && *next > 0 {
            *next -= 1;
            debug!(node = self.id, peer = from, next_index = *next, "backing off next index");
        }
        false
    }

    /// Move the commit index to the highest current-term entry held by a majority
    pub fn advance_commit_index(&mut self) -> bool {
        if self.state != NodeState::Leader {
            return false;
        }
        let quorum = self.quorum_size();
        let mut index = self.log.last_index();
        while index > self.commit_index {
            if self.log.term_at(index) != Some(self.current_term) {
                // older terms only commit indirectly
                break;
            }
            let replicas = 1 + self
                .peers()
                .filter(|p| self.match_index.get(p).copied().unwrap_or(NO_INDEX) >= index)
                .count();
            if replicas >= quorum {
                debug!(node = self.id, commit_index = index, "commit index advanced");
                self.commit_index = index;
                return true;
            }
            index -= 1;
        }
        false
    }

    // -- apply pipeline --

    /// Committed entries not yet handed to the state machine, in index order
    pub fn entries_to_apply(&self) -> &[LogEntry] {
        self.log.slice(self.last_applied + 1, self.commit_index)
    }

    /// Record that `index` was delivered; never moves backwards or past the commit index
    pub fn mark_applied(&mut self, index: LogIndex) {
        if index > self.last_applied && index <= self.commit_index {
            self.last_applied = index;
        }
    }

    // -- persistence bookkeeping --

    fn note_unpersisted(&mut self, index: LogIndex) {
        self.unpersisted_from = Some(self.unpersisted_from.map_or(index, |i| i.min(index)));
    }

    /// Lowest log index rewritten since the last call, if any
    pub fn take_unpersisted_from(&mut self) -> Option<LogIndex> {
        self.unpersisted_from.take()
    }

    /// Term and vote, the state that must survive a restart alongside the log
    pub fn hard_state(&self) -> (Term, Option<NodeId>) {
        (self.current_term, self.voted_for)
    }
}
