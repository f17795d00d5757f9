//! replikv - replicated in-memory key-value store
//!
//! A single node is a sharded in-memory key-value store behind a
//! line-protocol TCP server. Nodes compose into a master/slave cluster:
//! writes accepted on the master are applied locally first and then
//! pushed to slave peers over a framed binary channel, either
//! asynchronously (fire-and-forget relative to the writer) or
//! synchronously (the writer waits for every peer to acknowledge).
//! Reads are always served from the local store.
//!
//! # Architecture
//!
//! [`store::Store`] is the storage contract and [`store::MemoryStore`]
//! its concurrent implementation. [`store::ReplicatedStore`] decorates
//! any store with a [`replication::ReplicationStrategy`], which owns the
//! peer links, the replication listener and the propagation policy.
//! [`server::ConnectionServer`] turns the client line protocol into
//! store operations.
//!
//! # Features
//!
//! - Sharded in-memory store with per-shard locking
//! - Master/slave write propagation with per-peer retry and backoff
//! - Synchronous or asynchronous delivery
//! - CRC32-checksummed binary framing between peers
//! - Duplicate and echo suppression on the apply path

pub mod config;
pub mod error;
pub mod replication;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, NodeInfo, NodeRole, ReplicationConfig, StrategyKind};
    pub use crate::error::{Error, Result};
    pub use crate::replication::{
        MasterSlaveStrategy, ReplicationStatus, ReplicationStrategy, WriteOperation,
    };
    pub use crate::server::ConnectionServer;
    pub use crate::store::{MemoryStore, ReplicatedStore, Store};
}
