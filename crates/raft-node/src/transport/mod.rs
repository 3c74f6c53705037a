//! # transport
//!
//! why: the runner needs to reach peers without knowing how bytes move
//! relations: implemented by http.rs (real clusters) and memory.rs (tests)
//! what: Transport trait, RpcFuture, with_timeout
//!
//! every outbound call is bounded by the rpc timeout. a timeout, a dropped
//! connection or a garbled reply all come back as `TransportError`, and the
//! runner treats them the same way: no response this round.

pub mod http;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, NodeId, RequestVoteRequest, RequestVoteResponse,
};

use crate::error::TransportError;

pub use http::HttpTransport;
pub use memory::{MemoryNetwork, MemoryTransport};

pub type RpcFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Outbound rpc client shared by every per-peer send task
pub trait Transport: Send + Sync + 'static {
    fn request_vote(&self, target: NodeId, req: RequestVoteRequest) -> RpcFuture<'_, RequestVoteResponse>;

    fn append_entries(
        &self,
        target: NodeId,
        req: AppendEntriesRequest,
    ) -> RpcFuture<'_, AppendEntriesResponse>;
}

/// Bound `fut` by `limit`, mapping expiry to `TransportError::Timeout`
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let limit = Duration::from_millis(100);
        let res: Result<(), _> = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        assert!(matches!(res, Err(TransportError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let res = with_timeout(Duration::from_secs(1), async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }
}
