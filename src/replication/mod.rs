//! Replication layer
//!
//! [`ReplicationStrategy`] is the contract between a store and the
//! machinery that moves its writes between nodes. [`MasterSlaveStrategy`]
//! is the shipped implementation; [`create_strategy`] builds and
//! initializes whichever strategy the configuration selects.

pub mod master_slave;
pub mod op;
pub mod wire;

pub use master_slave::MasterSlaveStrategy;
pub use op::{OperationKind, WriteOperation};
pub use wire::{FrameHeader, PeerMessage};

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::{NodeRole, ReplicationConfig, StrategyKind};
use crate::error::{Error, Result};

/// Callback the receiver path hands each inbound operation to
pub type OperationSink = Arc<dyn Fn(WriteOperation) -> BoxFuture<'static, ()> + Send + Sync>;

/// Lifecycle of a strategy instance.
///
/// Transitions run strictly forward: created, initialized, running,
/// stopped. Stopped is terminal; a stopped strategy is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    /// Constructed, not yet configured
    Created,
    /// Configured, not yet started
    Initialized,
    /// Accepting and propagating operations
    Running,
    /// Shut down; terminal
    Stopped,
}

impl std::fmt::Display for StrategyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyState::Created => write!(f, "CREATED"),
            StrategyState::Initialized => write!(f, "INITIALIZED"),
            StrategyState::Running => write!(f, "RUNNING"),
            StrategyState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Snapshot of replication health
#[derive(Debug, Clone)]
pub struct ReplicationStatus {
    /// Role the strategy runs under
    pub role: NodeRole,

    /// Lifecycle state at snapshot time
    pub state: StrategyState,

    /// Peers with a live outbound link
    pub connected_peers: usize,

    /// Operations acknowledged by every target
    pub operations_propagated: u64,

    /// Operations received from peers
    pub operations_received: u64,

    /// Operations queued for asynchronous delivery
    pub pending_queue: usize,

    /// Completion time of the last health sweep
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
}

/// Contract between a replicated store and its propagation machinery
#[async_trait::async_trait]
pub trait ReplicationStrategy: Send + Sync {
    /// Configure the strategy; fails on an unsupported strategy kind or
    /// a structurally invalid configuration
    async fn initialize(&self, config: ReplicationConfig) -> Result<()>;

    /// Bind the replication listener and start background work
    async fn start(&self) -> Result<()>;

    /// Release all network and scheduling resources; idempotent
    async fn stop(&self) -> Result<()>;

    /// Whether this node's role may originate writes
    async fn can_accept_writes(&self) -> bool;

    /// Deliver an operation to this node's replication targets
    async fn propagate_write(&self, op: WriteOperation) -> Result<()>;

    /// Install the callback inbound operations are handed to
    async fn set_apply_sink(&self, sink: OperationSink);

    /// Current health snapshot
    async fn status(&self) -> ReplicationStatus;
}

/// Build and initialize the strategy selected by `config.strategy`
pub async fn create_strategy(config: ReplicationConfig) -> Result<Arc<dyn ReplicationStrategy>> {
    let strategy: Arc<dyn ReplicationStrategy> = match config.strategy {
        StrategyKind::MasterSlave => Arc::new(MasterSlaveStrategy::new()),
        other => {
            return Err(Error::Config(format!(
                "Unsupported replication strategy: {}",
                other
            )))
        }
    };

    strategy.initialize(config).await?;
    Ok(strategy)
}
