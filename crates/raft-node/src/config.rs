//! # config
//!
//! why: turn operator input into a validated node configuration
//! relations: consumed by service.rs; the `RaftArgs` flags are shared by both binaries
//! what: NodeConfig, RaftArgs, LogFormat, parse_cluster

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use raft_core::{NodeId, RaftConfig};

use crate::error::ConfigError;

/// Everything a node needs to start
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: NodeId,
    /// node id -> address (`host:port`) for every member, this node included
    pub cluster: BTreeMap<NodeId, String>,
    /// where the rpc server binds, defaults to this node's cluster address
    pub listen: Option<String>,
    pub raft: RaftConfig,
    /// persistence is enabled only when set
    pub data_dir: Option<PathBuf>,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }
        if !self.cluster.contains_key(&self.id) {
            return Err(ConfigError::UnknownNodeId(self.id, self.cluster.len()));
        }
        self.raft.validate()?;
        Ok(())
    }

    pub fn own_address(&self) -> Option<&str> {
        self.cluster.get(&self.id).map(String::as_str)
    }

    pub fn listen_address(&self) -> Option<&str> {
        self.listen.as_deref().or_else(|| self.own_address())
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.cluster.keys().copied().collect()
    }
}

/// Parse `host:port,host:port,...`; ids are assigned 1..=N in list order
pub fn parse_cluster(list: &str) -> Result<BTreeMap<NodeId, String>, ConfigError> {
    let mut cluster = BTreeMap::new();
    let mut next_id: NodeId = 1;
    for raw in list.split(',') {
        let addr = raw.trim();
        if addr.is_empty() {
            continue;
        }
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(ConfigError::InvalidAddress(addr.to_string())),
        }
        cluster.insert(next_id, addr.to_string());
        next_id += 1;
    }
    if cluster.is_empty() {
        return Err(ConfigError::EmptyCluster);
    }
    Ok(cluster)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Raft node flags, flattened into each binary's command line
#[derive(Debug, Clone, Args)]
pub struct RaftArgs {
    /// This node's id (1-based position in --cluster)
    #[arg(long, env = "RAFT_NODE_ID", default_value_t = 1)]
    pub id: NodeId,

    /// Comma-separated addresses of every cluster member
    #[arg(
        long,
        env = "RAFT_CLUSTER",
        default_value = "localhost:50051,localhost:50052,localhost:50053"
    )]
    pub cluster: String,

    /// Bind address for the raft rpc server (defaults to this node's cluster address)
    #[arg(long, env = "RAFT_LISTEN")]
    pub listen: Option<String>,

    /// Lower bound of the election timeout window, in ms
    #[arg(long, default_value_t = 150)]
    pub election_timeout_min: u64,

    /// Upper bound of the election timeout window, in ms
    #[arg(long, default_value_t = 300)]
    pub election_timeout_max: u64,

    /// Leader heartbeat period, in ms
    #[arg(long, default_value_t = 50)]
    pub heartbeat_interval: u64,

    /// Timeout for each outbound rpc, in ms
    #[arg(long, default_value_t = 100)]
    pub rpc_timeout: u64,

    /// Persist term, vote and log here; in-memory only when omitted
    #[arg(long, env = "RAFT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl RaftArgs {
    pub fn node_config(&self) -> Result<NodeConfig, ConfigError> {
        let config = NodeConfig {
            id: self.id,
            cluster: parse_cluster(&self.cluster)?,
            listen: self.listen.clone(),
            raft: RaftConfig {
                election_timeout_min: self.election_timeout_min,
                election_timeout_max: self.election_timeout_max,
                heartbeat_interval: self.heartbeat_interval,
                rpc_timeout: self.rpc_timeout,
            },
            data_dir: self.data_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_ids_follow_list_order() {
        let cluster = parse_cluster("a:1, b:2 ,c:3").unwrap();
        assert_eq!(cluster.get(&1).map(String::as_str), Some("a:1"));
        assert_eq!(cluster.get(&2).map(String::as_str), Some("b:2"));
        assert_eq!(cluster.get(&3).map(String::as_str), Some("c:3"));
    }

    #[test]
    fn empty_segments_do_not_consume_ids() {
        let cluster = parse_cluster("a:1,,b:2, ,").unwrap();
        assert_eq!(cluster.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(cluster.get(&2).map(String::as_str), Some("b:2"));
    }

    #[test]
    fn bad_address_rejected() {
        assert!(matches!(
            parse_cluster("localhost"),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(parse_cluster(" , "), Err(ConfigError::EmptyCluster)));
    }

    #[test]
    fn id_outside_cluster_rejected() {
        let config = NodeConfig {
            id: 4,
            cluster: parse_cluster("a:1,b:2,c:3").unwrap(),
            listen: None,
            raft: RaftConfig::default(),
            data_dir: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownNodeId(4, 3))
        ));
    }

    #[test]
    fn listen_defaults_to_cluster_address() {
        let config = NodeConfig {
            id: 2,
            cluster: parse_cluster("a:1,b:2").unwrap(),
            listen: None,
            raft: RaftConfig::default(),
            data_dir: None,
        };
        assert_eq!(config.listen_address(), Some("b:2"));
    }
}
