//! In-memory coordination store.
//!
//! A full-featured implementation of [`ClusterStore`] over a versioned map
//! plus a broadcast channel for watches. Used by the integration tests and
//! by local single-process runs; shares no code with a real backend but
//! honors the identical contract, including optimistic version checks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use super::{
    ChangeEvent, ChangeKind, ClusterStore, StoreResult, VersionedRecord, WriteOutcome,
};
use crate::record::Record;

/// Capacity of the change-event channel. Laggy subscribers observe a
/// `Lagged` error and re-read the paths they care about.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryStore {
    tree: Arc<RwLock<BTreeMap<String, (Record, u64)>>>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        MemoryStore {
            tree: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }

    fn notify(&self, path: &str, kind: ChangeKind) {
        // No subscribers is fine; send only fails then.
        let _ = self.events.send(ChangeEvent {
            path: path.to_string(),
            kind,
        });
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn read(&self, path: &str) -> StoreResult<Option<VersionedRecord>> {
        let tree = self.tree.read().await;
        Ok(tree.get(path).map(|(record, version)| VersionedRecord {
            record: record.clone(),
            version: *version,
        }))
    }

    async fn write(
        &self,
        path: &str,
        record: Record,
        expected_version: Option<u64>,
    ) -> StoreResult<WriteOutcome> {
        let mut tree = self.tree.write().await;
        let (kind, new_version) = match tree.get(path) {
            Some((_, current)) => {
                if let Some(expected) = expected_version {
                    if expected != *current {
                        trace!(path, expected, current, "conditional write lost race");
                        return Ok(WriteOutcome::VersionConflict);
                    }
                }
                (ChangeKind::Updated, current + 1)
            }
            None => {
                if expected_version.is_some() {
                    // Conditional write against a deleted path.
                    return Ok(WriteOutcome::VersionConflict);
                }
                (ChangeKind::Created, 0)
            }
        };
        tree.insert(path.to_string(), (record, new_version));
        drop(tree);
        self.notify(path, kind);
        Ok(WriteOutcome::Written(new_version))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let removed = self.tree.write().await.remove(path).is_some();
        if removed {
            self.notify(path, ChangeKind::Deleted);
        }
        Ok(())
    }

    async fn list_children(&self, path: &str) -> StoreResult<Vec<String>> {
        let prefix = format!("{path}/");
        let tree = self.tree.read().await;
        let mut children: Vec<String> = tree
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                // First path segment under the prefix: a record stored at
                // any depth makes every intermediate component a child of
                // its parent, even though no record sits at that component.
                let rest = &key[prefix.len()..];
                rest.split('/')
                    .next()
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
            .collect();
        children.dedup();
        Ok(children)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_delete() {
        let store = MemoryStore::new();
        let record = Record::new("a");

        let outcome = store.write("/c/live/n1", record.clone(), None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written(0));

        let read = store.read("/c/live/n1").await.unwrap().unwrap();
        assert_eq!(read.record, record);
        assert_eq!(read.version, 0);

        store.delete("/c/live/n1").await.unwrap();
        assert!(store.read("/c/live/n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_conflict_on_stale_write() {
        let store = MemoryStore::new();
        store.write("/c/x", Record::new("x"), None).await.unwrap();
        store.write("/c/x", Record::new("x"), None).await.unwrap();

        let outcome = store.write("/c/x", Record::new("x"), Some(0)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::VersionConflict);

        let outcome = store.write("/c/x", Record::new("x"), Some(1)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written(2));
    }

    #[tokio::test]
    async fn list_children_is_direct_only() {
        let store = MemoryStore::new();
        store
            .write("/c/observed/n1/s0/db", Record::new("db"), None)
            .await
            .unwrap();
        store
            .write("/c/observed/n1/s0/cache", Record::new("cache"), None)
            .await
            .unwrap();
        store
            .write("/c/observed/n1/s1/db", Record::new("db"), None)
            .await
            .unwrap();

        // Sessions exist only as intermediate path components; records live
        // one level deeper. Each session must still list exactly once.
        let sessions = store.list_children("/c/observed/n1").await.unwrap();
        assert_eq!(sessions, vec!["s0".to_string(), "s1".to_string()]);

        let resources = store.list_children("/c/observed/n1/s0").await.unwrap();
        assert_eq!(resources, vec!["cache".to_string(), "db".to_string()]);

        let nodes = store.list_children("/c/observed").await.unwrap();
        assert_eq!(nodes, vec!["n1".to_string()]);
    }

    #[tokio::test]
    async fn subscribe_sees_changes() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        store.write("/c/live/n1", Record::new("n1"), None).await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.path, "/c/live/n1");
        assert_eq!(event.kind, ChangeKind::Created);

        store.delete("/c/live/n1").await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
    }
}
