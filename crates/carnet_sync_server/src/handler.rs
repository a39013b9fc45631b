//! Request handlers for the sync endpoints.

use crate::changelog::ServerChangeLog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use carnet_sync_protocol::{ChangeUpload, ChangesResponse, PushOutcome, PushRequest, PushResponse};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Handler for sync requests.
pub struct SyncHandler {
    log: Arc<ServerChangeLog>,
    config: ServerConfig,
}

impl SyncHandler {
    /// Creates a handler over the given change log.
    pub fn new(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        Self { log, config }
    }

    /// Handles a changes request: one page strictly after `since`.
    pub fn handle_changes(&self, since: u64) -> ChangesResponse {
        let (changes, has_more) = self.log.changes_since(since, self.config.page_size as usize);
        let last_sync_id = changes.last().map(|c| c.id).unwrap_or(since);

        debug!(since, returned = changes.len(), has_more, "changes request");
        ChangesResponse::new(changes, last_sync_id, has_more)
    }

    /// Handles a push request.
    ///
    /// Outcomes align positionally with the request's changes and are
    /// independent of each other; a conflict on one entity never blocks the
    /// rest of the batch.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        if request.changes.len() > self.config.max_push_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many changes: {} > {}",
                request.changes.len(),
                self.config.max_push_batch
            )));
        }

        let results = request.changes.iter().map(|c| self.apply(c)).collect();
        let response = PushResponse::from_outcomes(results);
        debug!(
            accepted = response.success_count,
            rejected = response.failure_count,
            "push request"
        );
        Ok(response)
    }

    fn apply(&self, upload: &ChangeUpload) -> PushOutcome {
        if upload.operation.carries_payload() && upload.data.is_none() {
            return PushOutcome::failure(
                &upload.entity_id,
                format!("data required for {}", upload.operation),
            );
        }

        match self.log.apply(upload, now_millis()) {
            Ok(log_id) => {
                debug!(
                    entity_id = %upload.entity_id,
                    version = upload.version,
                    log_id,
                    "change accepted"
                );
                PushOutcome::success(&upload.entity_id)
            }
            Err(server_version) => {
                debug!(
                    entity_id = %upload.entity_id,
                    version = upload.version,
                    server_version,
                    "change conflicted"
                );
                PushOutcome::conflict(&upload.entity_id, server_version)
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
