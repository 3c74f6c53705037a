//! # http transport
//!
//! why: carry raft rpcs between processes as json over http
//! relations: the receiving side is server.rs
//! what: HttpTransport (reqwest client, POST /raft/request-vote and /raft/append-entries)

use std::collections::BTreeMap;

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, NodeId, RequestVoteRequest, RequestVoteResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use super::{RpcFuture, Transport};
use crate::error::TransportError;

pub const REQUEST_VOTE_PATH: &str = "/raft/request-vote";
pub const APPEND_ENTRIES_PATH: &str = "/raft/append-entries";
pub const STATUS_PATH: &str = "/raft/status";

pub struct HttpTransport {
    peers: BTreeMap<NodeId, String>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `peers` maps node id to `host:port`
    pub fn new(peers: BTreeMap<NodeId, String>) -> Self {
        Self {
            peers,
            client: reqwest::Client::new(),
        }
    }

    async fn send_rpc<Req, Resp>(&self, target: NodeId, path: &str, req: Req) -> Result<Resp, TransportError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let addr = self.peers.get(&target).ok_or(TransportError::UnknownPeer(target))?;
        let url = format!("http://{addr}{path}");
        trace!(peer = target, %url, "send_rpc");

        let resp = self.client.post(&url).json(&req).send().await.map_err(|e| {
            if e.is_connect() {
                return TransportError::Unreachable(target, e.to_string());
            }
            TransportError::from(e)
        })?;
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn request_vote(&self, target: NodeId, req: RequestVoteRequest) -> RpcFuture<'_, RequestVoteResponse> {
        Box::pin(self.send_rpc(target, REQUEST_VOTE_PATH, req))
    }

    fn append_entries(
        &self,
        target: NodeId,
        req: AppendEntriesRequest,
    ) -> RpcFuture<'_, AppendEntriesResponse> {
        Box::pin(self.send_rpc(target, APPEND_ENTRIES_PATH, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_peer_fails_fast() {
        let transport = HttpTransport::new(BTreeMap::new());
        let req = RequestVoteRequest {
            term: 1,
            candidate_id: 1,
            last_log_index: -1,
            last_log_term: 0,
        };

        let res = transport.request_vote(9, req).await;

        assert!(matches!(res, Err(TransportError::UnknownPeer(9))));
    }

    #[tokio::test]
    async fn closed_port_is_an_error() {
        // bind then drop, leaving a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let peers = BTreeMap::from([(2, addr)]);
        let transport = HttpTransport::new(peers);
        let req = AppendEntriesRequest {
            term: 1,
            leader_id: 1,
            prev_log_index: -1,
            prev_log_term: 0,
            entries: vec![],
            leader_commit: -1,
        };

        assert!(transport.append_entries(2, req).await.is_err());
    }
}
