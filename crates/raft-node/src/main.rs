//! raft-node: a bare cluster member that logs every applied command

use clap::Parser;
use raft_node::{shutdown_signal, start_node, telemetry, LoggingStateMachine, RaftArgs};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "raft-node", version, about = "Raft consensus node")]
struct Cli {
    #[command(flatten)]
    raft: RaftArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.raft.log_format);

    let config = cli.raft.node_config()?;
    info!(node = config.id, members = config.cluster.len(), "starting raft node");

    let node = start_node(&config, Box::new(LoggingStateMachine::new())).await?;
    node.run_until(shutdown_signal()).await?;

    info!(node = config.id, "raft node shut down");
    Ok(())
}
