//! Write operation records
//!
//! A [`WriteOperation`] is the unit of replication: an immutable record
//! of one mutation, stamped at the node that accepted the client write
//! and applied verbatim by every peer that receives it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation a write operation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Store a value under a key
    Put,
    /// Remove a key
    Remove,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Put => write!(f, "PUT"),
            OperationKind::Remove => write!(f, "REMOVE"),
        }
    }
}

/// Immutable record of a single mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOperation {
    /// Unique operation identity, used for duplicate suppression
    pub id: Uuid,

    /// Kind of mutation
    pub kind: OperationKind,

    /// Key the mutation applies to
    pub key: String,

    /// New value; `None` for removals
    pub value: Option<String>,

    /// Wall-clock milliseconds at the origin node; advisory only
    pub timestamp_ms: i64,

    /// Identifier of the node that accepted the client write
    pub source_node: String,
}

impl WriteOperation {
    /// Record a put originating at `source_node`
    pub fn put(
        key: impl Into<String>,
        value: impl Into<String>,
        source_node: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: OperationKind::Put,
            key: key.into(),
            value: Some(value.into()),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source_node: source_node.into(),
        }
    }

    /// Record a removal originating at `source_node`
    pub fn remove(key: impl Into<String>, source_node: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: OperationKind::Remove,
            key: key.into(),
            value: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source_node: source_node.into(),
        }
    }
}

impl std::fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (id={}, from={})",
            self.kind, self.key, self.id, self.source_node
        )
    }
}
