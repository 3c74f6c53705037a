//! kv-gateway: a raft node with the key-value store and its http api

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kv_store::{router, GatewayState, KvStateMachine, Store};
use raft_node::{shutdown_signal, start_node, telemetry, RaftArgs};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "kv-gateway", version, about = "Replicated key-value store gateway")]
struct Cli {
    /// Client-facing http address
    #[arg(long, env = "KV_GATEWAY_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// How long a write may wait for commit, in ms
    #[arg(long, default_value_t = 5000)]
    propose_timeout: u64,

    #[command(flatten)]
    raft: RaftArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.raft.log_format);

    let config = cli.raft.node_config()?;
    let store = Arc::new(Store::new());
    let node = start_node(&config, Box::new(KvStateMachine::new(Arc::clone(&store)))).await?;

    let state = GatewayState {
        raft: node.handle(),
        store,
        propose_timeout: Duration::from_millis(cli.propose_timeout),
    };
    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!(node = config.id, addr = %cli.addr, "kv gateway listening");

    let mut stop = node.shutdown_receiver();
    let gateway = tokio::spawn(async move {
        let res = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = res {
            error!(error = %e, "kv gateway server failed");
        }
    });

    let outcome = node.run_until(shutdown_signal()).await;
    let _ = gateway.await;
    outcome?;

    info!(node = config.id, "kv gateway shut down");
    Ok(())
}
