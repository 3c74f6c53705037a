//! # handle
//!
//! why: the only way other tasks talk to a running node
//! relations: wraps the runner's event channel; used by server.rs, the memory transport and kv-store
//! what: RaftHandle

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, LogIndex, NodeId, NodeStatus, RequestVoteRequest,
    RequestVoteResponse,
};
use tokio::sync::{mpsc, oneshot};

use crate::error::NodeError;
use crate::runner::Event;

/// Cheap to clone; every call is a message to the runner plus a oneshot reply
#[derive(Clone, Debug)]
pub struct RaftHandle {
    id: NodeId,
    tx: mpsc::Sender<Event>,
}

impl RaftHandle {
    pub(crate) fn new(id: NodeId, tx: mpsc::Sender<Event>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Event) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    pub async fn request_vote(&self, req: RequestVoteRequest) -> Result<RequestVoteResponse, NodeError> {
        self.call(|reply| Event::RequestVote { req, reply }).await
    }

    pub async fn append_entries(
        &self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, NodeError> {
        self.call(|reply| Event::AppendEntries { req, reply }).await
    }

    /// Append `command` to the leader's log and wait until it has been applied locally
    ///
    /// fails with `NotLeader` on followers and `LeadershipLost` if this node
    /// steps down first. the caller decides how long to wait.
    pub async fn propose(&self, command: Vec<u8>) -> Result<LogIndex, NodeError> {
        self.call(|reply| Event::Propose { command, reply }).await?
    }

    pub async fn status(&self) -> Result<NodeStatus, NodeError> {
        self.call(|reply| Event::Status { reply }).await
    }
}
