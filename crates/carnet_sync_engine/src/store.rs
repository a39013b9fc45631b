//! Local store capability.
//!
//! The engine never talks to the embedded store directly: it consumes the
//! [`SyncStore`] capability surface, always through the access lock in
//! [`crate::lock`]. The backing implementation varies per platform
//! (synchronous driver, worker-based asynchronous driver); the contract does
//! not.

use crate::error::StoreError;
use async_trait::async_trait;
use carnet_sync_protocol::{ChangeLog, ChangeOp, PendingChange};
use std::collections::HashMap;

/// Capability surface over the local store and its change log.
///
/// All methods take `&mut self`: callers hold the store exclusively through
/// a [`StoreGuard`](crate::lock::StoreGuard) for the duration of each call
/// sequence.
#[async_trait]
pub trait SyncStore: Send {
    /// Inserts or replaces an entity's payload.
    async fn upsert(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> Result<(), StoreError>;

    /// Removes an entity. Removing an absent entity is a no-op.
    async fn delete(&mut self, entity_type: &str, entity_id: &str) -> Result<(), StoreError>;

    /// Reads the sync cursor.
    async fn read_cursor(&mut self) -> Result<u64, StoreError>;

    /// Durably advances the sync cursor. Equal or lower ids are a no-op.
    async fn write_cursor(&mut self, id: u64) -> Result<(), StoreError>;

    /// Returns the pending changes in recorded order.
    async fn pending_changes(&mut self) -> Result<Vec<PendingChange>, StoreError>;

    /// Removes the pending entry matching `entity_id` and `version`.
    /// A no-op if no such entry exists.
    async fn confirm(&mut self, entity_id: &str, version: u64) -> Result<(), StoreError>;

    /// Marks the entity's pending entry conflicted with the server's version.
    async fn mark_conflicted(
        &mut self,
        entity_id: &str,
        server_version: u64,
    ) -> Result<(), StoreError>;

    /// Number of entries currently held back on conflicts.
    async fn conflicted_count(&mut self) -> Result<usize, StoreError>;
}

/// An in-memory store for tests and ephemeral sessions.
pub struct MemoryStore {
    entities: HashMap<(String, String), String>,
    log: ChangeLog,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            log: ChangeLog::new(),
        }
    }

    /// Records a locally committed mutation and returns its version.
    ///
    /// This is the write path the UI layer drives; CREATE/UPDATE also apply
    /// the payload to the entity table.
    pub fn record(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        operation: ChangeOp,
        payload: Option<String>,
    ) -> u64 {
        match (&operation, &payload) {
            (ChangeOp::Delete, _) => {
                self.entities
                    .remove(&(entity_type.to_string(), entity_id.to_string()));
            }
            (_, Some(data)) => {
                self.entities.insert(
                    (entity_type.to_string(), entity_id.to_string()),
                    data.clone(),
                );
            }
            (_, None) => {}
        }
        self.log.record(entity_type, entity_id, operation, payload)
    }

    /// Requeues a conflicted entry under a version derived from the
    /// server's. Returns the new version if the entity had one.
    pub fn resubmit_conflicted(&mut self, entity_id: &str) -> Option<u64> {
        self.log.resubmit_conflicted(entity_id)
    }

    /// Returns an entity's payload.
    pub fn get(&self, entity_type: &str, entity_id: &str) -> Option<&str> {
        self.entities
            .get(&(entity_type.to_string(), entity_id.to_string()))
            .map(String::as_str)
    }

    /// Number of stored entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Read access to the change log.
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn upsert(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> Result<(), StoreError> {
        self.entities.insert(
            (entity_type.to_string(), entity_id.to_string()),
            payload.to_string(),
        );
        Ok(())
    }

    async fn delete(&mut self, entity_type: &str, entity_id: &str) -> Result<(), StoreError> {
        self.entities
            .remove(&(entity_type.to_string(), entity_id.to_string()));
        Ok(())
    }

    async fn read_cursor(&mut self) -> Result<u64, StoreError> {
        Ok(self.log.cursor())
    }

    async fn write_cursor(&mut self, id: u64) -> Result<(), StoreError> {
        self.log.advance_cursor(id);
        Ok(())
    }

    async fn pending_changes(&mut self) -> Result<Vec<PendingChange>, StoreError> {
        Ok(self.log.pending().cloned().collect())
    }

    async fn confirm(&mut self, entity_id: &str, version: u64) -> Result<(), StoreError> {
        self.log.confirm(entity_id, version);
        Ok(())
    }

    async fn mark_conflicted(
        &mut self,
        entity_id: &str,
        server_version: u64,
    ) -> Result<(), StoreError> {
        self.log.mark_conflicted(entity_id, server_version);
        Ok(())
    }

    async fn conflicted_count(&mut self) -> Result<usize, StoreError> {
        Ok(self.log.conflicted_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_pending() {
        let mut store = MemoryStore::new();

        let v1 = store.record("Student", "s1", ChangeOp::Create, Some("{\"n\":1}".into()));
        let v2 = store.record("Student", "s1", ChangeOp::Update, Some("{\"n\":2}".into()));
        assert_eq!((v1, v2), (1, 2));

        // The write path applies the payload locally too.
        assert_eq!(store.get("Student", "s1"), Some("{\"n\":2}"));

        let pending = store.pending_changes().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].version, 1);
        assert_eq!(pending[1].version, 2);
    }

    #[tokio::test]
    async fn record_delete_removes_entity() {
        let mut store = MemoryStore::new();
        store.record("Student", "s1", ChangeOp::Create, Some("{}".into()));
        store.record("Student", "s1", ChangeOp::Delete, None);

        assert_eq!(store.get("Student", "s1"), None);
        assert_eq!(store.pending_changes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn remote_apply_does_not_touch_change_log() {
        let mut store = MemoryStore::new();

        store.upsert("Student", "s1", "{\"n\":1}").await.unwrap();
        store.delete("Student", "s1").await.unwrap();

        assert!(store.pending_changes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cursor_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.read_cursor().await.unwrap(), 0);

        store.write_cursor(7).await.unwrap();
        store.write_cursor(3).await.unwrap();
        assert_eq!(store.read_cursor().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn confirm_and_conflict_lifecycle() {
        let mut store = MemoryStore::new();
        let v = store.record("Student", "s1", ChangeOp::Create, Some("{}".into()));

        store.mark_conflicted("s1", 3).await.unwrap();
        assert_eq!(store.conflicted_count().await.unwrap(), 1);
        assert!(store.pending_changes().await.unwrap().is_empty());

        let new_version = store.resubmit_conflicted("s1").unwrap();
        assert_eq!(new_version, 4);

        store.confirm("s1", new_version).await.unwrap();
        assert!(store.pending_changes().await.unwrap().is_empty());
        assert_eq!(store.change_log().len(), 0);

        // Confirming again is a silent no-op.
        store.confirm("s1", v).await.unwrap();
    }
}
