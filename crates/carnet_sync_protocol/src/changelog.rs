//! Client change log.

use crate::operation::ChangeOp;
use std::collections::HashMap;
use std::collections::VecDeque;

/// Sync state of a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    /// Waiting to be pushed (or re-pushed after a transient failure).
    Pending,
    /// Lost a version race; held back until resolved by the caller.
    Conflicted {
        /// The server's version for the entity at rejection time.
        server_version: u64,
    },
}

/// One locally committed mutation not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Entity type of the affected record.
    pub entity_type: String,
    /// Entity id of the affected record.
    pub entity_id: String,
    /// The mutation kind.
    pub operation: ChangeOp,
    /// Per-entity version assigned at record time.
    pub version: u64,
    /// JSON-encoded entity payload; absent for DELETE.
    pub payload: Option<String>,
    /// Sync state of the entry.
    pub state: ChangeState,
}

impl PendingChange {
    /// Returns true if the entry is awaiting push.
    pub fn is_pending(&self) -> bool {
        self.state == ChangeState::Pending
    }

    /// Returns true if the entry is held back on a conflict.
    pub fn is_conflicted(&self) -> bool {
        matches!(self.state, ChangeState::Conflicted { .. })
    }
}

/// The client change log: pending local mutations plus the sync cursor.
///
/// The log maintains:
/// - Pending changes in the order they were recorded (insertion order is
///   sync-significant and never reordered)
/// - A per-entity version counter, strictly increasing across records
/// - The sync cursor: the highest server log id fully applied locally
///
/// # Invariants
///
/// - Versions for one entity never repeat and never decrease
/// - The cursor only advances; advancing to an equal or lower id is a no-op
/// - An entry leaves the log only through [`confirm`](ChangeLog::confirm) or
///   by being superseded through a new record for a conflicted entity
pub struct ChangeLog {
    /// Recorded changes, insertion order.
    entries: VecDeque<PendingChange>,
    /// Latest assigned (or server-reported) version per (entity_type, entity_id).
    versions: HashMap<(String, String), u64>,
    /// Highest server log id fully applied locally.
    cursor: u64,
}

impl ChangeLog {
    /// Creates a new empty change log.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            versions: HashMap::new(),
            cursor: 0,
        }
    }

    /// Creates a change log restored from a persisted cursor.
    pub fn with_cursor(cursor: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            versions: HashMap::new(),
            cursor,
        }
    }

    /// Records a locally committed mutation.
    ///
    /// Assigns the next version for the entity (strictly increasing; after a
    /// conflict the next version derives from the server's, not the stale
    /// local one) and returns it. A conflicted entry for the same entity is
    /// superseded: the new record replaces it in the queue.
    pub fn record(
        &mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: ChangeOp,
        payload: Option<String>,
    ) -> u64 {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        let key = (entity_type.clone(), entity_id.clone());

        let version = self.versions.get(&key).copied().unwrap_or(0) + 1;
        self.versions.insert(key, version);

        // A new mutation supersedes a held-back conflicted entry: the caller
        // has re-derived the entity from current local state.
        self.entries
            .retain(|e| !(e.entity_id == entity_id && e.entity_type == entity_type && e.is_conflicted()));

        self.entries.push_back(PendingChange {
            entity_type,
            entity_id,
            operation,
            version,
            payload,
            state: ChangeState::Pending,
        });

        version
    }

    /// Returns pending entries in the order they were recorded.
    ///
    /// Conflicted entries are excluded until resolved or resubmitted.
    pub fn pending(&self) -> impl Iterator<Item = &PendingChange> {
        self.entries.iter().filter(|e| e.is_pending())
    }

    /// Returns up to `limit` pending entries in recorded order.
    pub fn pending_batch(&self, limit: usize) -> Vec<PendingChange> {
        self.pending().take(limit).cloned().collect()
    }

    /// Returns the number of entries awaiting push.
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Returns the number of entries held back on conflicts.
    pub fn conflicted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_conflicted()).count()
    }

    /// Removes the entry matching `entity_id` and `version`.
    ///
    /// A no-op if no such entry exists (already confirmed by a prior cycle).
    pub fn confirm(&mut self, entity_id: &str, version: u64) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.entity_id == entity_id && e.version == version && e.is_pending())
        {
            self.entries.remove(pos);
        }
    }

    /// Marks the oldest pending entry for `entity_id` as conflicted.
    ///
    /// A future resubmission for the entity derives its version from
    /// `server_version` instead of the stale local one. A no-op if the
    /// entity has no pending entry.
    pub fn mark_conflicted(&mut self, entity_id: &str, server_version: u64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.entity_id == entity_id && e.is_pending())
        {
            entry.state = ChangeState::Conflicted { server_version };
            let key = (entry.entity_type.clone(), entry.entity_id.clone());
            let known = self.versions.entry(key).or_insert(0);
            *known = (*known).max(server_version);
        }
    }

    /// Requeues a conflicted entry under a version derived from the server's.
    ///
    /// This is the client-wins resolution hook: the held-back payload is
    /// resubmitted as-is with version `server_version + 1`. Returns the new
    /// version, or `None` if the entity has no conflicted entry.
    pub fn resubmit_conflicted(&mut self, entity_id: &str) -> Option<u64> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.entity_id == entity_id && e.is_conflicted())?;

        let mut entry = self.entries.remove(pos)?;
        let server_version = match entry.state {
            ChangeState::Conflicted { server_version } => server_version,
            ChangeState::Pending => unreachable!("position matched a conflicted entry"),
        };

        let version = server_version + 1;
        entry.version = version;
        entry.state = ChangeState::Pending;

        let key = (entry.entity_type.clone(), entry.entity_id.clone());
        self.versions.insert(key, version);
        self.entries.push_back(entry);

        Some(version)
    }

    /// Returns the sync cursor.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Advances the cursor to `new_id`.
    ///
    /// The cursor is never rewound; advancing with an equal or lower id is a
    /// no-op. Returns true if the cursor moved.
    pub fn advance_cursor(&mut self, new_id: u64) -> bool {
        if new_id > self.cursor {
            self.cursor = new_id;
            true
        } else {
            false
        }
    }

    /// Returns the total number of entries (pending and conflicted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}
