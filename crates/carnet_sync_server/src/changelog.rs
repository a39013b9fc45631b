//! Server-side change log.

use carnet_sync_protocol::{ChangeUpload, RemoteChange};
use parking_lot::RwLock;
use std::collections::HashMap;

struct LogInner {
    /// Changes in commit order; log ids are strictly increasing.
    entries: Vec<RemoteChange>,
    /// Next log id to assign.
    next_log_id: u64,
    /// Current version per (entity_type, entity_id).
    versions: HashMap<(String, String), u64>,
}

/// The server's append-only change log.
///
/// The log is the single source of ordering truth: every accepted change
/// gets a strictly increasing log id, and the per-entity version map decides
/// pushes by last-writer-wins-by-version.
pub struct ServerChangeLog {
    inner: RwLock<LogInner>,
}

impl ServerChangeLog {
    /// Creates a new empty change log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                entries: Vec::new(),
                next_log_id: 1,
                versions: HashMap::new(),
            }),
        }
    }

    /// Applies one uploaded change.
    ///
    /// Accepts the change if its version is strictly greater than the
    /// server's current version for the entity, assigning the next log id.
    /// Returns the server's current version otherwise (a conflict). The
    /// check and the append are one atomic step, so concurrent pushes to
    /// the same entity serialize correctly.
    pub fn apply(&self, upload: &ChangeUpload, timestamp: i64) -> Result<u64, u64> {
        let mut inner = self.inner.write();

        let key = (upload.entity_type.clone(), upload.entity_id.clone());
        let current = inner.versions.get(&key).copied().unwrap_or(0);
        if upload.version <= current {
            return Err(current);
        }

        let id = inner.next_log_id;
        inner.next_log_id += 1;
        inner.versions.insert(key, upload.version);
        inner.entries.push(RemoteChange {
            id,
            entity_type: upload.entity_type.clone(),
            entity_id: upload.entity_id.clone(),
            operation: upload.operation,
            timestamp,
            data: upload.data.clone(),
        });

        Ok(id)
    }

    /// Returns up to `limit` changes strictly after `since`, in log order,
    /// and whether more remain beyond them.
    pub fn changes_since(&self, since: u64, limit: usize) -> (Vec<RemoteChange>, bool) {
        let inner = self.inner.read();

        // Entries are sorted by id; find the first one past the cursor.
        let start = inner.entries.partition_point(|c| c.id <= since);
        let end = (start + limit).min(inner.entries.len());
        let page = inner.entries[start..end].to_vec();
        let has_more = end < inner.entries.len();

        (page, has_more)
    }

    /// Returns the server's current version for an entity (0 if unknown).
    pub fn current_version(&self, entity_type: &str, entity_id: &str) -> u64 {
        self.inner
            .read()
            .versions
            .get(&(entity_type.to_string(), entity_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns the highest assigned log id.
    pub fn cursor(&self) -> u64 {
        self.inner.read().next_log_id - 1
    }

    /// Returns the number of logged changes.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if no changes have been logged.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Default for ServerChangeLog {
    fn default() -> Self {
        Self::new()
    }
}
