//! Configuration structures for replikv
//!
//! [`Config`] mirrors the TOML file consumed by the binary.
//! [`ReplicationConfig`] is the flattened runtime form handed to a
//! replication strategy; it carries everything the strategy needs to
//! know about this node and its peers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Replication configuration; absent means the node runs standalone
    #[serde(default)]
    pub replication: Option<ReplicationSection>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Role this node plays in the cluster
    #[serde(default = "default_role")]
    pub role: NodeRole,

    /// Address the client-facing server binds to
    #[serde(default = "default_client_listen")]
    pub client_listen: String,
}

/// Replication section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSection {
    /// Port the replication listener binds to
    #[serde(default = "default_replication_port")]
    pub port: u16,

    /// Strategy used to propagate writes
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Interval between peer health checks in milliseconds
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Connect and round-trip timeout per peer in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Delivery retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Propagate writes without blocking the writer
    #[serde(default = "default_true", rename = "async")]
    pub async_replication: bool,

    /// Peer nodes in the cluster
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts client writes and propagates them to slaves
    Master,
    /// Applies writes pushed from a master; never originates propagation
    Slave,
    /// Propagates to every other peer; reserved for symmetric topologies
    Peer,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "MASTER"),
            NodeRole::Slave => write!(f, "SLAVE"),
            NodeRole::Peer => write!(f, "PEER"),
        }
    }
}

/// Write propagation strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Single master pushing writes to slave peers
    MasterSlave,
    /// Reserved; not implemented
    MultiMaster,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::MasterSlave
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::MasterSlave => write!(f, "master-slave"),
            StrategyKind::MultiMaster => write!(f, "multi-master"),
        }
    }
}

/// A peer node in the cluster topology.
///
/// Identity is the node id alone: equality and hashing ignore host, port
/// and role, so a node that moves or changes role is still the same node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier
    pub id: String,

    /// Hostname or IP address
    pub host: String,

    /// Replication listener port
    pub port: u16,

    /// Role of the peer
    #[serde(default = "default_role")]
    pub role: NodeRole,
}

impl NodeInfo {
    /// Create a new peer description
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        role: NodeRole,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            role,
        }
    }

    /// host:port address of the peer's replication listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeInfo {}

impl std::hash::Hash for NodeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Immutable runtime replication configuration handed to a strategy
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// This node's identifier
    pub node_id: String,

    /// This node's role
    pub role: NodeRole,

    /// Known nodes in the cluster; may include this node
    pub nodes: Vec<NodeInfo>,

    /// Port the replication listener binds to; 0 picks an ephemeral port
    pub replication_port: u16,

    /// Interval between peer health checks in milliseconds
    pub sync_interval_ms: u64,

    /// Connect and round-trip timeout per peer in milliseconds
    pub connection_timeout_ms: u64,

    /// Delivery retries after the first failed attempt
    pub max_retries: u32,

    /// Propagate writes without blocking the writer
    pub async_replication: bool,

    /// Strategy used to propagate writes
    pub strategy: StrategyKind,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            role: default_role(),
            nodes: Vec::new(),
            replication_port: default_replication_port(),
            sync_interval_ms: default_sync_interval_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_retries: default_max_retries(),
            async_replication: true,
            strategy: StrategyKind::default(),
        }
    }
}

impl ReplicationConfig {
    /// Validate the structural invariants a strategy relies on
    pub fn validate(&self) -> crate::Result<()> {
        if self.node_id.is_empty() {
            return Err(crate::Error::Config("node id cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.is_empty() {
                return Err(crate::Error::Config(
                    "peer node id cannot be empty".to_string(),
                ));
            }
            if node.host.is_empty() {
                return Err(crate::Error::Config(format!(
                    "peer {} host cannot be empty",
                    node.id
                )));
            }
            if node.port == 0 {
                return Err(crate::Error::Config(format!(
                    "peer {} port cannot be 0",
                    node.id
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate peer node id: {}",
                    node.id
                )));
            }
        }

        Ok(())
    }

    /// Peers this node propagates writes to, given its role.
    ///
    /// Masters target their slaves, peers target everyone, slaves target
    /// no one. This node is never its own target.
    pub fn replication_targets(&self) -> Vec<NodeInfo> {
        match self.role {
            NodeRole::Master => self
                .nodes
                .iter()
                .filter(|n| n.id != self.node_id && n.role == NodeRole::Slave)
                .cloned()
                .collect(),
            NodeRole::Peer => self
                .nodes
                .iter()
                .filter(|n| n.id != self.node_id)
                .cloned()
                .collect(),
            NodeRole::Slave => Vec::new(),
        }
    }

    /// Peer health check interval as a Duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Per-peer connect and round-trip timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".to_string()));
        }

        if self.node.client_listen.is_empty() {
            return Err(crate::Error::Config(
                "node.client_listen cannot be empty".to_string(),
            ));
        }

        if let Some(replication) = self.replication_config() {
            replication.validate()?;
        }

        Ok(())
    }

    /// Runtime replication configuration, if this node replicates at all
    pub fn replication_config(&self) -> Option<ReplicationConfig> {
        self.replication.as_ref().map(|r| ReplicationConfig {
            node_id: self.node.id.clone(),
            role: self.node.role,
            nodes: r.nodes.clone(),
            replication_port: r.port,
            sync_interval_ms: r.sync_interval_ms,
            connection_timeout_ms: r.connection_timeout_ms,
            max_retries: r.max_retries,
            async_replication: r.async_replication,
            strategy: r.strategy,
        })
    }
}

fn default_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_role() -> NodeRole {
    NodeRole::Slave
}

fn default_client_listen() -> String {
    "127.0.0.1:7000".to_string()
}

fn default_replication_port() -> u16 {
    9090
}

fn default_sync_interval_ms() -> u64 {
    1000
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [node]
            id = "node-1"
            role = "master"
            client_listen = "127.0.0.1:7000"

            [replication]
            port = 9090
            strategy = "master-slave"
            sync_interval_ms = 500
            connection_timeout_ms = 2000
            max_retries = 5
            async = false

            [[replication.nodes]]
            id = "node-2"
            host = "10.0.0.2"
            port = 9090
            role = "slave"

            [logging]
            level = "debug"
        "#;

        let config = Config::from_str(toml_str).unwrap();
        assert_eq!(config.node.id, "node-1");
        assert_eq!(config.node.role, NodeRole::Master);
        assert_eq!(config.logging.level, "debug");

        let replication = config.replication_config().unwrap();
        assert_eq!(replication.replication_port, 9090);
        assert_eq!(replication.strategy, StrategyKind::MasterSlave);
        assert_eq!(replication.sync_interval_ms, 500);
        assert_eq!(replication.max_retries, 5);
        assert!(!replication.async_replication);
        assert_eq!(replication.nodes.len(), 1);
        assert_eq!(replication.nodes[0].id, "node-2");
        assert_eq!(replication.nodes[0].address(), "10.0.0.2:9090");
    }

    #[test]
    fn test_standalone_config() {
        let config = Config::from_str("[node]\nid = \"solo\"").unwrap();
        assert_eq!(config.node.role, NodeRole::Slave);
        assert_eq!(config.node.client_listen, "127.0.0.1:7000");
        assert!(config.replication.is_none());
        assert!(config.replication_config().is_none());
    }

    #[test]
    fn test_replication_defaults() {
        let toml_str = r#"
            [node]
            id = "node-1"
            role = "slave"

            [replication]
        "#;

        let config = Config::from_str(toml_str).unwrap();
        let replication = config.replication_config().unwrap();
        assert_eq!(replication.replication_port, 9090);
        assert_eq!(replication.sync_interval_ms, 1000);
        assert_eq!(replication.connection_timeout_ms, 5000);
        assert_eq!(replication.max_retries, 3);
        assert!(replication.async_replication);
        assert_eq!(replication.strategy, StrategyKind::MasterSlave);
        assert!(replication.nodes.is_empty());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replikv.toml");
        std::fs::write(&path, "[node]\nid = \"file-node\"\nrole = \"master\"").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.node.id, "file-node");
        assert_eq!(config.node.role, NodeRole::Master);
    }

    #[test]
    fn test_duplicate_peer_rejected() {
        let toml_str = r#"
            [node]
            id = "node-1"
            role = "master"

            [replication]

            [[replication.nodes]]
            id = "node-2"
            host = "10.0.0.2"
            port = 9090

            [[replication.nodes]]
            id = "node-2"
            host = "10.0.0.3"
            port = 9090
        "#;

        let result = Config::from_str(toml_str);
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_peer_port_zero_rejected() {
        let config = ReplicationConfig {
            nodes: vec![NodeInfo::new("node-2", "10.0.0.2", 0, NodeRole::Slave)],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_node_identity_is_id_only() {
        let a = NodeInfo::new("node-1", "10.0.0.1", 9090, NodeRole::Master);
        let b = NodeInfo::new("node-1", "10.0.0.99", 9999, NodeRole::Slave);
        let c = NodeInfo::new("node-2", "10.0.0.1", 9090, NodeRole::Master);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_replication_targets_by_role() {
        let nodes = vec![
            NodeInfo::new("node-1", "10.0.0.1", 9090, NodeRole::Master),
            NodeInfo::new("node-2", "10.0.0.2", 9090, NodeRole::Slave),
            NodeInfo::new("node-3", "10.0.0.3", 9090, NodeRole::Slave),
        ];

        let master = ReplicationConfig {
            node_id: "node-1".to_string(),
            role: NodeRole::Master,
            nodes: nodes.clone(),
            ..Default::default()
        };
        let targets = master.replication_targets();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|n| n.role == NodeRole::Slave));

        let slave = ReplicationConfig {
            node_id: "node-2".to_string(),
            role: NodeRole::Slave,
            nodes: nodes.clone(),
            ..Default::default()
        };
        assert!(slave.replication_targets().is_empty());

        let peer = ReplicationConfig {
            node_id: "node-2".to_string(),
            role: NodeRole::Peer,
            nodes,
            ..Default::default()
        };
        assert_eq!(peer.replication_targets().len(), 2);
    }

    #[test]
    fn test_default_replication_config() {
        let config = ReplicationConfig::default();
        assert!(!config.node_id.is_empty());
        assert_eq!(config.role, NodeRole::Slave);
        assert_eq!(config.replication_port, 9090);
        assert_eq!(config.sync_interval(), Duration::from_millis(1000));
        assert_eq!(config.connection_timeout(), Duration::from_millis(5000));
        assert_eq!(config.max_retries, 3);
        assert!(config.async_replication);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(NodeRole::Master.to_string(), "MASTER");
        assert_eq!(NodeRole::Slave.to_string(), "SLAVE");
        assert_eq!(StrategyKind::MasterSlave.to_string(), "master-slave");
    }
}
