//! # gateway
//!
//! why: client-facing http api over the replicated store
//! relations: reads the local Store, routes writes through RaftHandle::propose
//! what: GatewayState, GatewayError, router
//!
//! writes return once committed and applied on this node. reads are served
//! from local state and may lag the leader.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use raft_core::{NodeId, RaftError};
use raft_node::{NodeError, RaftHandle};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::Command;
use crate::store::Store;

pub const DEFAULT_PROPOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct GatewayState {
    pub raft: RaftHandle,
    pub store: Arc<Store>,
    pub propose_timeout: Duration,
}

impl GatewayState {
    pub fn new(raft: RaftHandle, store: Arc<Store>) -> Self {
        Self {
            raft,
            store,
            propose_timeout: DEFAULT_PROPOSE_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not the leader")]
    NotLeader { leader: Option<NodeId> },

    #[error("leadership lost before the write was applied")]
    LeadershipLost,

    #[error("write not committed within {0:?}")]
    Timeout(Duration),

    #[error("key not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("raft node unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<NodeError> for GatewayError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Raft(RaftError::NotLeader { leader }) => GatewayError::NotLeader { leader },
            NodeError::LeadershipLost => GatewayError::LeadershipLost,
            NodeError::Stopped => GatewayError::Unavailable("raft node has stopped".into()),
            NodeError::Apply(msg) => GatewayError::BadRequest(msg),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NotLeader { .. } => StatusCode::MISDIRECTED_REQUEST,
            GatewayError::LeadershipLost | GatewayError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            GatewayError::NotLeader { leader } => json!({ "error": self.to_string(), "leader": leader }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/kv/", get(missing_key).put(missing_key).delete(missing_key))
        .route("/kv/:key", get(get_key).put(put_key).delete(delete_key))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PutBody {
    value: Option<String>,
}

async fn missing_key() -> GatewayError {
    GatewayError::BadRequest("key is required".into())
}

async fn get_key(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let value = state.store.get(&key).ok_or(GatewayError::NotFound)?;
    Ok(Json(json!({
        "key": key,
        "value": String::from_utf8_lossy(&value),
    })))
}

async fn put_key(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
    body: Result<Json<PutBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), GatewayError> {
    let Json(body) = body.map_err(|_| GatewayError::BadRequest("invalid request".into()))?;
    let value = body
        .value
        .ok_or_else(|| GatewayError::BadRequest("value is required".into()))?;

    propose(&state, Command::put(key.clone(), value)).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "key": key, "status": "created" })),
    ))
}

async fn delete_key(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    if !state.store.contains(&key) {
        return Err(GatewayError::NotFound);
    }
    propose(&state, Command::delete(key.clone())).await?;
    Ok(Json(json!({ "key": key, "status": "deleted" })))
}

async fn health(State(state): State<GatewayState>) -> Result<Json<Value>, GatewayError> {
    let status = state.raft.status().await?;
    Ok(Json(json!({
        "status": "healthy",
        "keys": state.store.len(),
        "role": status.state,
        "term": status.term,
        "leader": status.leader,
    })))
}

async fn propose(state: &GatewayState, command: Command) -> Result<(), GatewayError> {
    let bytes = command
        .encode()
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    match tokio::time::timeout(state.propose_timeout, state.raft.propose(bytes)).await {
        Ok(Ok(index)) => {
            debug!(index, key = command.key(), "write applied");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            warn!(key = command.key(), timeout = ?state.propose_timeout, "write timed out");
            Err(GatewayError::Timeout(state.propose_timeout))
        }
    }
}
