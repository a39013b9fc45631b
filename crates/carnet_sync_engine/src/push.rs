//! Push pipeline: pending local changes → server.

use crate::error::{SyncError, SyncResult};
use crate::lock::StoreLock;
use crate::store::SyncStore;
use crate::transport::SyncTransport;
use carnet_sync_protocol::{ChangeUpload, PendingChange, PushRequest};
use tracing::{debug, info, warn};

/// Result of pushing one batch of pending changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Changes the server accepted and that were confirmed locally.
    pub confirmed: u64,
    /// Changes that lost a version race and were marked conflicted.
    pub conflicts: u64,
    /// Changes the server rejected; left pending for the next cycle.
    pub failures: u64,
}

/// Pushes the full pending batch and applies the per-change outcomes.
///
/// The batch goes out in one request, in recorded order; the server's
/// results align positionally. Outcomes are independent: a conflicting
/// entity never blocks confirmation of unrelated entities in the same
/// batch. Conflicted entries are not retried within the cycle; they wait
/// for the caller's resolution or the next local mutation.
pub async fn push_pending<T, S>(transport: &T, lock: &StoreLock<S>) -> SyncResult<PushSummary>
where
    T: SyncTransport + ?Sized,
    S: SyncStore,
{
    let batch = {
        let mut store = lock.acquire().await?;
        store.pending_changes().await?
    };

    if batch.is_empty() {
        debug!("nothing to push");
        return Ok(PushSummary::default());
    }

    let request = PushRequest::new(batch.iter().map(upload_from).collect());
    let response = transport.push_changes(&request).await?;

    if response.results.len() != batch.len() {
        return Err(SyncError::Protocol(format!(
            "push results misaligned: sent {}, got {}",
            batch.len(),
            response.results.len()
        )));
    }

    let mut summary = PushSummary::default();
    let mut store = lock.acquire().await?;

    for (entry, outcome) in batch.iter().zip(response.results.iter()) {
        if outcome.success {
            store.confirm(&entry.entity_id, entry.version).await?;
            summary.confirmed += 1;
        } else if outcome.conflict {
            match outcome.server_version {
                Some(server_version) => {
                    store.mark_conflicted(&entry.entity_id, server_version).await?;
                    summary.conflicts += 1;
                    warn!(
                        entity_id = %entry.entity_id,
                        version = entry.version,
                        server_version,
                        "change conflicted"
                    );
                }
                None => {
                    // Contract violation; keep the entry pending rather than
                    // guess a version to derive from.
                    summary.failures += 1;
                    warn!(
                        entity_id = %entry.entity_id,
                        "conflict outcome without serverVersion; leaving pending"
                    );
                }
            }
        } else {
            summary.failures += 1;
            warn!(
                entity_id = %entry.entity_id,
                error = outcome.error_message.as_deref().unwrap_or("unknown"),
                "change rejected; will retry next cycle"
            );
        }
    }
    drop(store);

    info!(
        confirmed = summary.confirmed,
        conflicts = summary.conflicts,
        failures = summary.failures,
        "push complete"
    );
    Ok(summary)
}

fn upload_from(change: &PendingChange) -> ChangeUpload {
    ChangeUpload {
        entity_type: change.entity_type.clone(),
        entity_id: change.entity_id.clone(),
        operation: change.operation,
        version: change.version,
        data: change.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;
    use carnet_sync_protocol::{ChangeOp, ChangeState, PushOutcome, PushResponse};
    use std::time::Duration;

    fn lock_with(pending: &[(&str, ChangeOp)]) -> StoreLock<MemoryStore> {
        let mut store = MemoryStore::new();
        for (id, op) in pending {
            let payload = op.carries_payload().then(|| "{}".to_string());
            store.record("Student", id, *op, payload);
        }
        StoreLock::new(store, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn accepted_change_is_confirmed_and_removed() {
        // Scenario: one pending CREATE, server accepts it.
        let lock = lock_with(&[("s1", ChangeOp::Create)]);
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::success(
            "s1",
        )])));

        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary, PushSummary { confirmed: 1, conflicts: 0, failures: 0 });

        let mut store = lock.acquire().await.unwrap();
        assert!(store.pending_changes().await.unwrap().is_empty());
        assert_eq!(store.change_log().len(), 0);
    }

    #[tokio::test]
    async fn conflicted_change_is_marked_not_retried() {
        // Scenario: server reports a conflict with its version 3.
        let lock = lock_with(&[("s1", ChangeOp::Create)]);
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::conflict(
            "s1", 3,
        )])));

        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary.conflicts, 1);

        let mut store = lock.acquire().await.unwrap();
        // Still in the log, held back, carrying the server's version.
        assert_eq!(store.change_log().len(), 1);
        assert_eq!(store.conflicted_count().await.unwrap(), 1);
        let entry = store
            .change_log()
            .pending()
            .next();
        assert!(entry.is_none(), "conflicted entry must not be re-pushed");
        drop(store);

        // A second push finds nothing to send: not auto-retried in-cycle.
        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary, PushSummary::default());
        assert_eq!(transport.pushed_requests().len(), 1);
    }

    #[tokio::test]
    async fn conflict_carries_server_version_for_resubmission() {
        let lock = lock_with(&[("s1", ChangeOp::Update)]);
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::conflict(
            "s1", 7,
        )])));

        push_pending(&transport, &lock).await.unwrap();

        let mut store = lock.acquire().await.unwrap();
        let version = store.resubmit_conflicted("s1").unwrap();
        assert_eq!(version, 8);
        let pending = store.pending_changes().await.unwrap();
        assert_eq!(pending[0].state, ChangeState::Pending);
    }

    #[tokio::test]
    async fn outcomes_apply_independently() {
        let lock = lock_with(&[
            ("s1", ChangeOp::Create),
            ("s2", ChangeOp::Create),
            ("s3", ChangeOp::Delete),
        ]);
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![
            PushOutcome::success("s1"),
            PushOutcome::conflict("s2", 4),
            PushOutcome::failure("s3", "validation failed"),
        ])));

        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary, PushSummary { confirmed: 1, conflicts: 1, failures: 1 });

        let mut store = lock.acquire().await.unwrap();
        let pending = store.pending_changes().await.unwrap();
        // Only the rejected change remains pending for the next cycle.
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, "s3");
        assert_eq!(store.conflicted_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_preserves_recorded_order() {
        let lock = lock_with(&[("s1", ChangeOp::Create), ("s2", ChangeOp::Create)]);
        {
            // A second change to s1, recorded after s2.
            let mut store = lock.acquire().await.unwrap();
            store.record("Student", "s1", ChangeOp::Update, Some("{\"n\":2}".into()));
        }

        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![
            PushOutcome::success("s1"),
            PushOutcome::success("s2"),
            PushOutcome::success("s1"),
        ])));

        push_pending(&transport, &lock).await.unwrap();

        let sent = &transport.pushed_requests()[0];
        let order: Vec<_> = sent
            .changes
            .iter()
            .map(|c| (c.entity_id.as_str().to_string(), c.version))
            .collect();
        assert_eq!(
            order,
            vec![("s1".into(), 1), ("s2".into(), 1), ("s1".into(), 2)]
        );
    }

    #[tokio::test]
    async fn misaligned_results_are_a_protocol_error() {
        let lock = lock_with(&[("s1", ChangeOp::Create), ("s2", ChangeOp::Create)]);
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::success(
            "s1",
        )])));

        let result = push_pending(&transport, &lock).await;
        assert!(matches!(result, Err(SyncError::Protocol(_))));

        // Nothing was confirmed: both changes still pending.
        let mut store = lock.acquire().await.unwrap();
        assert_eq!(store.pending_changes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_sends_no_request() {
        let lock = lock_with(&[]);
        let transport = MockTransport::new();

        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary, PushSummary::default());
        assert!(transport.pushed_requests().is_empty());
    }

    #[tokio::test]
    async fn conflict_without_server_version_stays_pending() {
        let lock = lock_with(&[("s1", ChangeOp::Update)]);
        let transport = MockTransport::new();
        let mut outcome = PushOutcome::conflict("s1", 0);
        outcome.server_version = None;
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![outcome])));

        let summary = push_pending(&transport, &lock).await.unwrap();
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.conflicts, 0);

        let mut store = lock.acquire().await.unwrap();
        assert_eq!(store.pending_changes().await.unwrap().len(), 1);
    }
}
