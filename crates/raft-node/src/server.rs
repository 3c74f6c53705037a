//! # server
//!
//! why: receive raft rpcs from peers over http
//! relations: counterpart of transport/http.rs; forwards into the runner through RaftHandle
//! what: router (POST /raft/request-vote, POST /raft/append-entries, GET /raft/status)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, NodeStatus, RaftError, RequestVoteRequest,
    RequestVoteResponse,
};
use serde_json::json;

use crate::error::NodeError;
use crate::handle::RaftHandle;
use crate::transport::http::{APPEND_ENTRIES_PATH, REQUEST_VOTE_PATH, STATUS_PATH};

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NodeError::Raft(RaftError::NotLeader { .. }) => StatusCode::MISDIRECTED_REQUEST,
            NodeError::Raft(RaftError::InvalidConfig(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::LeadershipLost | NodeError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            NodeError::Apply(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NodeError::Storage(_) | NodeError::Listen(..) | NodeError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({
            "error": self.to_string(),
            "leader": self.leader_hint(),
        });
        (status, Json(body)).into_response()
    }
}

/// Routes for peer traffic, with the handle as shared state
pub fn router(handle: RaftHandle) -> Router {
    Router::new()
        .route(REQUEST_VOTE_PATH, post(request_vote))
        .route(APPEND_ENTRIES_PATH, post(append_entries))
        .route(STATUS_PATH, get(status))
        .with_state(handle)
}

async fn request_vote(
    State(handle): State<RaftHandle>,
    Json(req): Json<RequestVoteRequest>,
) -> Result<Json<RequestVoteResponse>, NodeError> {
    Ok(Json(handle.request_vote(req).await?))
}

async fn append_entries(
    State(handle): State<RaftHandle>,
    Json(req): Json<AppendEntriesRequest>,
) -> Result<Json<AppendEntriesResponse>, NodeError> {
    Ok(Json(handle.append_entries(req).await?))
}

async fn status(State(handle): State<RaftHandle>) -> Result<Json<NodeStatus>, NodeError> {
    Ok(Json(handle.status().await?))
}
