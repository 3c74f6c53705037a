//! # service
//!
//! why: wire config, storage, transport, runner and rpc server into a running node
//! relations: used by both binaries; tests build runners directly instead
//! what: start_node, RunningNode, shutdown_signal

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use raft_core::RaftNode;
use raft_storage::FileStorage;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::apply::StateMachine;
use crate::config::NodeConfig;
use crate::error::{ConfigError, NodeError};
use crate::handle::RaftHandle;
use crate::runner::Runner;
use crate::server;
use crate::transport::HttpTransport;

/// A node with its runner and rpc server spawned
pub struct RunningNode {
    handle: RaftHandle,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    runner: JoinHandle<Result<(), NodeError>>,
    server: JoinHandle<()>,
}

/// Build and spawn everything a node needs; returns once the rpc port is bound
pub async fn start_node(
    config: &NodeConfig,
    machine: Box<dyn StateMachine>,
) -> Result<RunningNode, NodeError> {
    config.validate()?;
    let listen = config
        .listen_address()
        .ok_or(ConfigError::UnknownNodeId(config.id, config.cluster.len()))?
        .to_string();

    let peers = config
        .cluster
        .iter()
        .filter(|(id, _)| **id != config.id)
        .map(|(id, addr)| (*id, addr.clone()))
        .collect();
    let transport = Arc::new(HttpTransport::new(peers));
    let node = RaftNode::with_config(config.id, config.member_ids(), config.raft.clone());

    let mut runner = Runner::new(node, transport, machine);
    if let Some(dir) = &config.data_dir {
        info!(node = config.id, dir = %dir.display(), "persistence enabled");
        runner = runner.with_storage(Box::new(FileStorage::new(dir)?))?;
    }
    let handle = runner.handle();

    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|e| NodeError::Listen(listen.clone(), e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| NodeError::Listen(listen.clone(), e))?;
    info!(node = config.id, %local_addr, "raft rpc server listening");

    let (shutdown, shutdown_rx) = watch::channel(false);

    let app = server::router(handle.clone());
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let res = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = res {
            error!(error = %e, "raft rpc server failed");
        }
    });
    let runner = tokio::spawn(runner.run(shutdown_rx));

    Ok(RunningNode {
        handle,
        local_addr,
        shutdown,
        runner,
        server,
    })
}

impl RunningNode {
    pub fn handle(&self) -> RaftHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// a receiver that flips to true when this node is told to stop
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Serve until `signal` completes or the runner dies on its own, then stop
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), NodeError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            res = &mut self.runner => {
                let _ = self.shutdown.send(true);
                let _ = self.server.await;
                return res.unwrap_or(Err(NodeError::Stopped));
            }
        }
        self.shutdown().await
    }

    /// Stop the runner and the rpc server and wait for both
    pub async fn shutdown(self) -> Result<(), NodeError> {
        let _ = self.shutdown.send(true);
        let _ = self.server.await;
        self.runner.await.unwrap_or(Err(NodeError::Stopped))
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
