//! Coordination-store seam.
//!
//! The controller and participants never talk to a concrete store directly;
//! they consume the narrow [`ClusterStore`] trait. This keeps the
//! orchestration core testable against [`MemoryStore`] and lets a real
//! backend (ZooKeeper-like tree, Raft-backed KV) plug in behind the same
//! contract.
//!
//! # Contract
//!
//! - Records are versioned; [`ClusterStore::write`] takes an optional
//!   expected version and reports [`WriteOutcome::VersionConflict`] instead
//!   of clobbering a concurrent update.
//! - Reads of missing paths return `Ok(None)`, not an error. Only actual
//!   unavailability surfaces as [`StoreError`].
//! - [`ClusterStore::subscribe`] yields a broadcast stream of path-level
//!   change events used by the controller trigger loop and participant
//!   message watchers.
//!
//! # Persisted layout
//!
//! ```text
//! /{cluster}/placement/{resource}
//! /{cluster}/live/{node}
//! /{cluster}/observed/{node}/{session}/{resource}
//! /{cluster}/messages/{node}/{messageId}
//! /{cluster}/stateModelDefs/{name}
//! /{cluster}/config/{node}
//! ```
//!
//! Path helpers live in [`paths`]; nothing else in the crate concatenates
//! path strings by hand.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::record::Record;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the coordination-store collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store is unreachable or a read failed unrecoverably.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost an optimistic-concurrency race.
    #[error("version conflict at {0}")]
    VersionConflict(String),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(String),
}

/// A record together with the store version it was read at.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub record: Record,
    pub version: u64,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write was applied; carries the new version.
    Written(u64),
    /// The expected version no longer matched.
    VersionConflict,
}

/// Kind of change reported by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A path-level change notification.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: String,
    pub kind: ChangeKind,
}

/// The coordination-store contract consumed by the orchestration core.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Read the record at `path`, if present.
    async fn read(&self, path: &str) -> StoreResult<Option<VersionedRecord>>;

    /// Write `record` at `path`. When `expected_version` is given the write
    /// only applies if the stored version still matches.
    async fn write(
        &self,
        path: &str,
        record: Record,
        expected_version: Option<u64>,
    ) -> StoreResult<WriteOutcome>;

    /// Delete the record at `path`. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Names of the direct children of `path`, sorted.
    async fn list_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Subscribe to change events for every path in the store. Callers
    /// filter by prefix.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Builders for the persisted path layout.
pub mod paths {
    /// `/{cluster}/placement/{resource}`
    pub fn placement(cluster: &str, resource: &str) -> String {
        format!("/{cluster}/placement/{resource}")
    }

    /// Parent of all placement policies.
    pub fn placement_root(cluster: &str) -> String {
        format!("/{cluster}/placement")
    }

    /// `/{cluster}/live/{node}`
    pub fn live_instance(cluster: &str, node: &str) -> String {
        format!("/{cluster}/live/{node}")
    }

    pub fn live_root(cluster: &str) -> String {
        format!("/{cluster}/live")
    }

    /// `/{cluster}/observed/{node}/{session}/{resource}`
    pub fn observed_state(cluster: &str, node: &str, session: &str, resource: &str) -> String {
        format!("/{cluster}/observed/{node}/{session}/{resource}")
    }

    pub fn observed_node_root(cluster: &str, node: &str) -> String {
        format!("/{cluster}/observed/{node}")
    }

    pub fn observed_session_root(cluster: &str, node: &str, session: &str) -> String {
        format!("/{cluster}/observed/{node}/{session}")
    }

    /// `/{cluster}/messages/{node}/{messageId}`
    pub fn message(cluster: &str, node: &str, message_id: &str) -> String {
        format!("/{cluster}/messages/{node}/{message_id}")
    }

    pub fn message_queue(cluster: &str, node: &str) -> String {
        format!("/{cluster}/messages/{node}")
    }

    /// `/{cluster}/stateModelDefs/{name}`
    pub fn state_model_def(cluster: &str, name: &str) -> String {
        format!("/{cluster}/stateModelDefs/{name}")
    }

    pub fn state_model_def_root(cluster: &str) -> String {
        format!("/{cluster}/stateModelDefs")
    }

    /// `/{cluster}/config/{node}`
    pub fn instance_config(cluster: &str, node: &str) -> String {
        format!("/{cluster}/config/{node}")
    }

    pub fn instance_config_root(cluster: &str) -> String {
        format!("/{cluster}/config")
    }
}
