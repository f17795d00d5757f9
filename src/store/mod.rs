//! Storage layer
//!
//! [`Store`] is the capability contract the front end programs against.
//! [`MemoryStore`] is the concurrent in-memory implementation and
//! [`ReplicatedStore`] the decorator that attaches a replication
//! strategy to any store.

pub mod memory;
pub mod replicated;

pub use memory::MemoryStore;
pub use replicated::ReplicatedStore;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::replication::{self, OperationSink, WriteOperation};

/// Capability contract for key-value storage
#[async_trait]
pub trait Store<K, V>: Send + Sync {
    /// Look up a key; `None` when absent
    async fn get(&self, key: &K) -> Option<V>;

    /// Store a value under a key, replacing any existing value
    async fn put(&self, key: K, value: V) -> Result<()>;

    /// Remove a key; removing an absent key is an error
    async fn remove(&self, key: &K) -> Result<()>;
}

/// Build a standalone in-memory store
pub fn standalone() -> Arc<MemoryStore<String, String>> {
    Arc::new(MemoryStore::new())
}

/// Build a store wired to a replication strategy.
///
/// The strategy is created from `config`, the apply path of the returned
/// store is installed as its sink, and the strategy is started before
/// this returns.
pub async fn replicated(
    config: ReplicationConfig,
) -> Result<Arc<ReplicatedStore<MemoryStore<String, String>>>> {
    let strategy = replication::create_strategy(config.clone()).await?;
    let store = Arc::new(ReplicatedStore::new(
        MemoryStore::new(),
        Arc::clone(&strategy),
        config.node_id,
    ));

    let apply_target = Arc::downgrade(&store);
    let sink: OperationSink = Arc::new(move |op: WriteOperation| -> BoxFuture<'static, ()> {
        let apply_target = apply_target.clone();
        Box::pin(async move {
            if let Some(store) = apply_target.upgrade() {
                store.apply_operation(op).await;
            }
        })
    });
    strategy.set_apply_sink(sink).await;
    strategy.start().await?;

    Ok(store)
}
