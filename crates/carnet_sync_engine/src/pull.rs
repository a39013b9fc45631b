//! Pull pipeline: server changes → local store.

use crate::error::{SyncError, SyncResult};
use crate::lock::StoreLock;
use crate::store::SyncStore;
use crate::transport::SyncTransport;
use carnet_sync_protocol::{ChangeOp, RemoteChange};
use tracing::{debug, info};

/// Result of pulling one page of server changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    /// Number of changes applied from this page.
    pub applied: u64,
    /// The cursor after this page: the highest log id durably applied.
    pub new_cursor: u64,
    /// Whether the server reports more changes beyond this page.
    pub has_more: bool,
}

/// Pulls one page of changes strictly after `since` and applies it.
///
/// Changes are applied in ascending log id order, each one under its own
/// lock acquisition, and the durable cursor advances to a change's id only
/// after that change is applied. A failure mid-page therefore leaves the
/// cursor at the last applied change, and the next pull resumes from there.
/// Changes at or below the cursor are skipped, never reapplied.
pub async fn pull_page<T, S>(
    transport: &T,
    lock: &StoreLock<S>,
    since: u64,
) -> SyncResult<PullOutcome>
where
    T: SyncTransport + ?Sized,
    S: SyncStore,
{
    let response = transport.fetch_changes(since).await?;

    if response.has_more && response.changes.is_empty() {
        return Err(SyncError::Protocol(
            "server reported more changes but sent an empty page".into(),
        ));
    }

    let mut applied = 0u64;
    let mut cursor = since;

    for change in &response.changes {
        if change.id <= cursor {
            debug!(id = change.id, cursor, "skipping already-applied change");
            continue;
        }

        apply_change(lock, change).await?;
        cursor = change.id;
        applied += 1;
    }

    Ok(PullOutcome {
        applied,
        new_cursor: cursor,
        has_more: response.has_more,
    })
}

/// Pulls until the server reports no more changes.
///
/// Returns the total number of changes applied and the final cursor.
pub async fn pull_all<T, S>(transport: &T, lock: &StoreLock<S>) -> SyncResult<(u64, u64)>
where
    T: SyncTransport + ?Sized,
    S: SyncStore,
{
    let mut cursor = {
        let mut store = lock.acquire().await?;
        store.read_cursor().await?
    };

    let mut total = 0u64;
    loop {
        let outcome = pull_page(transport, lock, cursor).await?;
        total += outcome.applied;
        cursor = outcome.new_cursor;

        if !outcome.has_more {
            break;
        }
    }

    info!(pulled = total, cursor, "pull complete");
    Ok((total, cursor))
}

async fn apply_change<S: SyncStore>(lock: &StoreLock<S>, change: &RemoteChange) -> SyncResult<()> {
    let mut store = lock.acquire().await?;

    match change.operation {
        ChangeOp::Create | ChangeOp::Update => {
            let data = change.data.as_deref().ok_or_else(|| {
                SyncError::Protocol(format!("change {} has no data", change.id))
            })?;
            store.upsert(&change.entity_type, &change.entity_id, data).await?;
        }
        ChangeOp::Delete => {
            store.delete(&change.entity_type, &change.entity_id).await?;
        }
    }

    // The cursor must not pass a change until that change is durable.
    store.write_cursor(change.id).await?;
    Ok(())
}
