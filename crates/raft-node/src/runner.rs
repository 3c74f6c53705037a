//! # runner
//!
//! why: drive a RaftNode with real time, real peers and a real state machine
//! relations: owns raft-core's RaftNode, the timers, a Transport, the apply pipeline and optional storage
//! what: Event, Runner (the single task that mutates node state)
//!
//! everything that touches the node goes through one select loop: inbound
//! rpcs, proposals, status queries, results of outbound rpcs, the two
//! timers and shutdown. outbound rpcs run in short-lived tasks that only
//! report back through the event channel, so no lock guards the node.
//!
//! with storage attached, term, vote and log changes are flushed before the
//! reply to whatever caused them leaves this task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, AppendProgress, LogIndex, NodeId, NodeStatus,
    RaftNode, RequestVoteRequest, RequestVoteResponse, Term,
};
use raft_storage::Storage;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::apply::{ApplyPipeline, StateMachine};
use crate::error::{NodeError, TransportError};
use crate::handle::RaftHandle;
use crate::timer::{ElectionTimer, HeartbeatScheduler};
use crate::transport::{with_timeout, Transport};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the runner reacts to besides its timers
pub(crate) enum Event {
    RequestVote {
        req: RequestVoteRequest,
        reply: oneshot::Sender<RequestVoteResponse>,
    },
    AppendEntries {
        req: AppendEntriesRequest,
        reply: oneshot::Sender<AppendEntriesResponse>,
    },
    Propose {
        command: Vec<u8>,
        reply: oneshot::Sender<Result<LogIndex, NodeError>>,
    },
    Status {
        reply: oneshot::Sender<NodeStatus>,
    },
    VoteResult {
        peer: NodeId,
        /// term of the election the request belonged to
        term: Term,
        result: Result<RequestVoteResponse, TransportError>,
    },
    AppendResult {
        peer: NodeId,
        sent: AppendProgress,
        result: Result<AppendEntriesResponse, TransportError>,
    },
}

enum Step {
    Event(Event),
    ElectionTimeout,
    Heartbeat,
    Shutdown,
}

/// a proposal waiting for its entry to be applied
struct Waiter {
    term: Term,
    reply: oneshot::Sender<Result<LogIndex, NodeError>>,
}

pub struct Runner {
    node: RaftNode,
    transport: Arc<dyn Transport>,
    apply: ApplyPipeline,
    storage: Option<Box<dyn Storage + Send>>,
    persisted: (Term, Option<NodeId>),
    election: ElectionTimer,
    heartbeat: HeartbeatScheduler,
    rpc_timeout: Duration,
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    /// peer -> leader term of its outstanding AppendEntries
    in_flight: HashMap<NodeId, Term>,
    waiters: BTreeMap<LogIndex, Waiter>,
    was_leader: bool,
}

impl Runner {
    pub fn new(node: RaftNode, transport: Arc<dyn Transport>, machine: Box<dyn StateMachine>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let election = ElectionTimer::new(&node.config);
        let heartbeat = HeartbeatScheduler::new(&node.config);
        let rpc_timeout = node.config.rpc();
        let persisted = node.hard_state();
        Self {
            node,
            transport,
            apply: ApplyPipeline::new(machine),
            storage: None,
            persisted,
            election,
            heartbeat,
            rpc_timeout,
            tx,
            rx,
            in_flight: HashMap::new(),
            waiters: BTreeMap::new(),
            was_leader: false,
        }
    }

    /// Attach durable storage, restoring whatever it already holds
    pub fn with_storage(mut self, storage: Box<dyn Storage + Send>) -> Result<Self, NodeError> {
        let (term, voted_for) = storage.load_term_and_vote()?;
        let entries = storage.load_log()?;
        info!(
            node = self.node.id,
            term,
            ?voted_for,
            entries = entries.len(),
            "restored persistent state"
        );
        self.node.restore(term, voted_for, entries);
        self.persisted = (term, voted_for);
        self.storage = Some(storage);
        Ok(self)
    }

    pub fn handle(&self) -> RaftHandle {
        RaftHandle::new(self.node.id, self.tx.clone())
    }

    pub fn node(&self) -> &RaftNode {
        &self.node
    }

    /// Process events until `shutdown` flips to true or its sender goes away
    ///
    /// only a storage failure ends the loop with an error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        info!(node = self.node.id, peers = ?self.node.peers().collect::<Vec<_>>(), "raft runner started");
        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            let step = tokio::select! {
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => Step::Shutdown,
                },
                Some(event) = self.rx.recv() => Step::Event(event),
                _ = self.election.fired() => Step::ElectionTimeout,
                _ = self.heartbeat.tick() => Step::Heartbeat,
            };

            let res = match step {
                Step::Event(event) => self.handle_event(event),
                Step::ElectionTimeout => self.on_election_timeout(),
                Step::Heartbeat => {
                    self.broadcast_append();
                    Ok(())
                }
                Step::Shutdown => break Ok(()),
            };
            if let Err(e) = res {
                error!(node = self.node.id, error = %e, "raft runner failed");
                break Err(e);
            }
            self.sync_role();
        };

        self.election.cancel();
        self.heartbeat.stop();
        self.fail_waiters(|| NodeError::Stopped);
        info!(node = self.node.id, term = self.node.current_term, "raft runner stopped");
        outcome
    }

    fn handle_event(&mut self, event: Event) -> Result<(), NodeError> {
        match event {
            Event::RequestVote { req, reply } => {
                let (resp, reset) = self.node.handle_request_vote(&req);
                if reset {
                    self.election.reset();
                }
                self.persist()?;
                let _ = reply.send(resp);
            }
            Event::AppendEntries { req, reply } => {
                let (resp, reset) = self.node.handle_append_entries(req);
                if reset {
                    self.election.reset();
                }
                self.persist()?;
                let _ = reply.send(resp);
                self.apply_committed();
            }
            Event::Propose { command, reply } => match self.node.propose(command) {
                Ok(entry) => {
                    self.persist()?;
                    debug!(node = self.node.id, index = entry.index, term = entry.term, "proposal appended");
                    self.prune_abandoned_waiters();
                    self.waiters.insert(
                        entry.index,
                        Waiter {
                            term: entry.term,
                            reply,
                        },
                    );
                    self.broadcast_append();
                    self.apply_committed();
                }
                Err(e) => {
                    let _ = reply.send(Err(e.into()));
                }
            },
            Event::Status { reply } => {
                let _ = reply.send(self.node.status());
            }
            Event::VoteResult { peer, term, result } => {
                match result {
                    Ok(resp) => {
                        self.node.handle_vote_response(peer, term, &resp);
                    }
                    Err(e) => debug!(node = self.node.id, peer, error = %e, "vote request failed"),
                }
                self.persist()?;
            }
            Event::AppendResult { peer, sent, result } => {
                if self.in_flight.get(&peer) == Some(&sent.term) {
                    self.in_flight.remove(&peer);
                }
                match result {
                    Ok(resp) => {
                        let accepted = resp.success;
                        if self.node.handle_append_entries_response(peer, sent, &resp) {
                            self.apply_committed();
                        }
                        self.persist()?;
                        if accepted && self.lagging(peer) {
                            self.send_append(peer);
                        }
                    }
                    Err(e) => debug!(node = self.node.id, peer, error = %e, "append entries failed"),
                }
            }
        }
        Ok(())
    }

    fn on_election_timeout(&mut self) -> Result<(), NodeError> {
        if self.node.is_leader() {
            return Ok(());
        }
        let req = self.node.start_election();
        // our own vote must be durable before anyone else sees the request
        self.persist()?;
        for peer in self.node.peers().collect::<Vec<_>>() {
            let transport = Arc::clone(&self.transport);
            let tx = self.tx.clone();
            let req = req.clone();
            let limit = self.rpc_timeout;
            tokio::spawn(async move {
                let term = req.term;
                let result = with_timeout(limit, transport.request_vote(peer, req)).await;
                let _ = tx.send(Event::VoteResult { peer, term, result }).await;
            });
        }
        Ok(())
    }

    fn broadcast_append(&mut self) {
        if !self.node.is_leader() {
            return;
        }
        for peer in self.node.peers().collect::<Vec<_>>() {
            self.send_append(peer);
        }
    }

    /// one AppendEntries per peer at a time; skipped while a request is outstanding
    fn send_append(&mut self, peer: NodeId) {
        if self.in_flight.contains_key(&peer) {
            return;
        }
        let Some(req) = self.node.create_append_entries(peer) else {
            return;
        };
        let sent = req.progress();
        self.in_flight.insert(peer, sent.term);

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let limit = self.rpc_timeout;
        tokio::spawn(async move {
            let result = with_timeout(limit, transport.append_entries(peer, req)).await;
            let _ = tx.send(Event::AppendResult { peer, sent, result }).await;
        });
    }

    fn lagging(&self, peer: NodeId) -> bool {
        self.node.is_leader()
            && self
                .node
                .next_index
                .get(&peer)
                .is_some_and(|&next| next <= self.node.last_log_index())
    }

    fn apply_committed(&mut self) {
        let entries = self.node.entries_to_apply().to_vec();
        for entry in entries {
            let outcome = self.apply.deliver(&entry);
            self.node.mark_applied(entry.index);
            let Some(waiter) = self.waiters.remove(&entry.index) else {
                continue;
            };
            let res = if waiter.term != entry.term {
                Err(NodeError::LeadershipLost)
            } else {
                match outcome {
                    Some(Err(e)) => Err(NodeError::Apply(e.to_string())),
                    _ => Ok(entry.index),
                }
            };
            let _ = waiter.reply.send(res);
        }
    }

    /// start or stop the leader machinery after any change of role
    fn sync_role(&mut self) {
        let leading = self.node.is_leader();
        if leading && !self.was_leader {
            self.was_leader = true;
            self.election.cancel();
            self.heartbeat.start();
            self.broadcast_append();
        } else if !leading && self.was_leader {
            self.was_leader = false;
            self.heartbeat.stop();
            self.in_flight.clear();
            self.fail_waiters(|| NodeError::LeadershipLost);
            self.election.reset();
        }
        if !leading && !self.election.is_armed() {
            self.election.reset();
        }
    }

    /// drop waiters whose proposer stopped listening (gateway timeouts)
    fn prune_abandoned_waiters(&mut self) {
        let before = self.waiters.len();
        self.waiters.retain(|_, w| !w.reply.is_closed());
        let dropped = before - self.waiters.len();
        if dropped > 0 {
            debug!(node = self.node.id, dropped, "dropped abandoned proposals");
        }
    }

    fn fail_waiters(&mut self, err: impl Fn() -> NodeError) {
        if !self.waiters.is_empty() {
            warn!(node = self.node.id, pending = self.waiters.len(), "failing pending proposals");
        }
        for (_, waiter) in std::mem::take(&mut self.waiters) {
            let _ = waiter.reply.send(Err(err()));
        }
    }

    fn persist(&mut self) -> Result<(), NodeError> {
        let Some(storage) = self.storage.as_mut() else {
            self.node.take_unpersisted_from();
            return Ok(());
        };
        let hard_state = self.node.hard_state();
        if hard_state != self.persisted {
            storage.save_term_and_vote(hard_state.0, hard_state.1)?;
            self.persisted = hard_state;
        }
        if let Some(from) = self.node.take_unpersisted_from() {
            storage.replace_log_from(from, &self.node.log.entries_from(from))?;
        }
        Ok(())
    }
}
