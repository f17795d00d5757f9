//! Replication-aware store decorator
//!
//! [`ReplicatedStore`] wraps any [`Store`]: local application always
//! happens first and is authoritative for this node, then the write is
//! handed to the replication strategy. Propagation failures are logged,
//! never surfaced to the writer. The apply path is the receiving end of
//! the same contract: operations pushed from peers land here, with
//! echoes and duplicates discarded.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::Store;
use crate::error::Result;
use crate::replication::{OperationKind, ReplicationStatus, ReplicationStrategy, WriteOperation};

/// Operation ids remembered for duplicate suppression
const REPLAY_WINDOW: usize = 4096;

/// Bounded set of recently applied operation ids, evicted oldest-first
struct ReplayWindow {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl ReplayWindow {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Record an id; false if it was already present
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > REPLAY_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Store decorator that forwards local writes to a replication strategy
/// and applies writes received from peers
pub struct ReplicatedStore<S> {
    inner: Arc<S>,
    strategy: Arc<dyn ReplicationStrategy>,
    node_id: String,
    window: Mutex<ReplayWindow>,
}

impl<S> ReplicatedStore<S>
where
    S: Store<String, String>,
{
    /// Wrap a store with a replication strategy
    pub fn new(inner: S, strategy: Arc<dyn ReplicationStrategy>, node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(inner),
            strategy,
            node_id: node_id.into(),
            window: Mutex::new(ReplayWindow::new()),
        }
    }

    /// This node's identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Direct handle to the undecorated store
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Health snapshot of the attached strategy
    pub async fn status(&self) -> ReplicationStatus {
        self.strategy.status().await
    }

    /// Stop the attached strategy
    pub async fn shutdown(&self) -> Result<()> {
        self.strategy.stop().await
    }

    /// Hand an operation to the strategy if this node may originate writes
    async fn propagate(&self, op: WriteOperation) {
        if !self.strategy.can_accept_writes().await {
            return;
        }
        if let Err(e) = self.strategy.propagate_write(op).await {
            tracing::warn!("Write propagation failed: {}", e);
        }
    }

    /// Apply an operation received from a peer.
    ///
    /// Operations that originated here or were already applied are
    /// discarded. Store-level failures are logged rather than returned so
    /// one bad operation cannot stall the receiver.
    pub async fn apply_operation(&self, op: WriteOperation) {
        if op.source_node == self.node_id {
            tracing::debug!("Skipping echoed operation {}", op.id);
            return;
        }

        if !self.window.lock().await.insert(op.id) {
            tracing::debug!("Skipping duplicate operation {}", op.id);
            return;
        }

        tracing::debug!("Applying {}", op);
        match op.kind {
            OperationKind::Put => match op.value {
                Some(value) => {
                    if let Err(e) = self.inner.put(op.key, value).await {
                        tracing::warn!("Failed to apply put {}: {}", op.id, e);
                    }
                }
                None => tracing::warn!("Dropping put {} with no value", op.id),
            },
            OperationKind::Remove => {
                if let Err(e) = self.inner.remove(&op.key).await {
                    tracing::debug!("Remove {} had no effect: {}", op.id, e);
                }
            }
        }
    }
}

#[async_trait]
impl<S> Store<String, String> for ReplicatedStore<S>
where
    S: Store<String, String>,
{
    async fn get(&self, key: &String) -> Option<String> {
        self.inner.get(key).await
    }

    async fn put(&self, key: String, value: String) -> Result<()> {
        self.inner.put(key.clone(), value.clone()).await?;
        self.propagate(WriteOperation::put(key, value, self.node_id.clone()))
            .await;
        Ok(())
    }

    async fn remove(&self, key: &String) -> Result<()> {
        self.inner.remove(key).await?;
        self.propagate(WriteOperation::remove(key.clone(), self.node_id.clone()))
            .await;
        Ok(())
    }
}
