//! # memory transport
//!
//! why: run whole clusters inside one process for tests
//! relations: routes calls straight into each node's RaftHandle
//! what: MemoryNetwork (shared registry with partitions), MemoryTransport

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, NodeId, RequestVoteRequest, RequestVoteResponse,
};

use super::{RpcFuture, Transport};
use crate::error::TransportError;
use crate::handle::RaftHandle;

#[derive(Default)]
struct Registry {
    nodes: HashMap<NodeId, RaftHandle>,
    isolated: HashSet<NodeId>,
}

/// Shared switchboard; every node's MemoryTransport points at the same one
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, handle: RaftHandle) {
        self.registry().nodes.insert(handle.id(), handle);
    }

    pub fn unregister(&self, id: NodeId) {
        self.registry().nodes.remove(&id);
    }

    /// drop all traffic to and from `id`
    pub fn isolate(&self, id: NodeId) {
        self.registry().isolated.insert(id);
    }

    pub fn heal(&self, id: NodeId) {
        self.registry().isolated.remove(&id);
    }

    pub fn heal_all(&self) {
        self.registry().isolated.clear();
    }

    pub fn transport_for(&self, id: NodeId) -> MemoryTransport {
        MemoryTransport {
            id,
            network: self.clone(),
        }
    }

    fn route(&self, from: NodeId, to: NodeId) -> Result<RaftHandle, TransportError> {
        let registry = self.registry();
        if registry.isolated.contains(&from) || registry.isolated.contains(&to) {
            return Err(TransportError::Unreachable(to, "partitioned".to_string()));
        }
        registry
            .nodes
            .get(&to)
            .cloned()
            .ok_or(TransportError::UnknownPeer(to))
    }
}

/// One node's view of the MemoryNetwork
#[derive(Clone)]
pub struct MemoryTransport {
    id: NodeId,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn request_vote(&self, target: NodeId, req: RequestVoteRequest) -> RpcFuture<'_, RequestVoteResponse> {
        Box::pin(async move {
            let handle = self.network.route(self.id, target)?;
            handle
                .request_vote(req)
                .await
                .map_err(|e| TransportError::Unreachable(target, e.to_string()))
        })
    }

    fn append_entries(
        &self,
        target: NodeId,
        req: AppendEntriesRequest,
    ) -> RpcFuture<'_, AppendEntriesResponse> {
        Box::pin(async move {
            let handle = self.network.route(self.id, target)?;
            handle
                .append_entries(req)
                .await
                .map_err(|e| TransportError::Unreachable(target, e.to_string()))
        })
    }
}
