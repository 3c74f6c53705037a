//! # raft-node
//!
//! why: run raft-core's state machine as a live cluster member
//! relations: drives raft-core, persists through raft-storage, serves kv-store
//! what: runner loop, timers, transports, apply pipeline, rpc server, node config

pub mod apply;
pub mod config;
pub mod error;
pub mod handle;
pub mod runner;
pub mod server;
pub mod service;
pub mod telemetry;
pub mod timer;
pub mod transport;

pub use apply::{ApplyError, ApplyPipeline, LoggingStateMachine, StateMachine};
pub use config::{parse_cluster, LogFormat, NodeConfig, RaftArgs};
pub use error::{ConfigError, NodeError, TransportError};
pub use handle::RaftHandle;
pub use runner::Runner;
pub use service::{shutdown_signal, start_node, RunningNode};
pub use transport::{HttpTransport, MemoryNetwork, MemoryTransport, Transport};
