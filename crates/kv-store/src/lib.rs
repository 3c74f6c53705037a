//! # kv-store
//!
//! why: a replicated key-value store, the first consumer of the raft log
//! relations: built on raft-node's StateMachine and RaftHandle
//! what: Store, Command, KvStateMachine, http gateway

pub mod command;
pub mod gateway;
pub mod machine;
pub mod store;

pub use command::{Command, CommandError};
pub use gateway::{router, GatewayError, GatewayState};
pub use machine::KvStateMachine;
pub use store::{Store, StoreError};
