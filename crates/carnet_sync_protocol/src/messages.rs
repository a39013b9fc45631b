//! Wire messages for the sync endpoints.
//!
//! Two endpoints make up the contract:
//!
//! - `GET /api/sync/changes?since={lastSyncId}` returns a [`ChangesResponse`]
//! - `POST /api/sync/push` takes a [`PushRequest`] and returns a
//!   [`PushResponse`] whose results align positionally with the request
//!
//! All bodies are JSON with camelCase field names.

use crate::operation::ChangeOp;
use serde::{Deserialize, Serialize};

/// One entry of the server's change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    /// Server-assigned log id, strictly increasing. Used as the pull cursor.
    pub id: u64,
    /// Entity type of the affected record.
    pub entity_type: String,
    /// Entity id of the affected record.
    pub entity_id: String,
    /// The mutation kind.
    pub operation: ChangeOp,
    /// Server-side commit time, epoch milliseconds. Opaque to clients;
    /// ordering truth is `id`.
    pub timestamp: i64,
    /// JSON-encoded entity payload. Omitted for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RemoteChange {
    /// Creates an upsert entry (CREATE or UPDATE).
    pub fn upsert(
        id: u64,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: ChangeOp,
        timestamp: i64,
        data: impl Into<String>,
    ) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation,
            timestamp,
            data: Some(data.into()),
        }
    }

    /// Creates a DELETE entry.
    pub fn delete(
        id: u64,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation: ChangeOp::Delete,
            timestamp,
            data: None,
        }
    }
}

/// Response body of the changes endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    /// Changes strictly after the requested cursor, ascending by id.
    pub changes: Vec<RemoteChange>,
    /// The server's cursor after this page.
    pub last_sync_id: u64,
    /// Whether more changes remain beyond this page.
    pub has_more: bool,
}

impl ChangesResponse {
    /// Creates a new changes response.
    pub fn new(changes: Vec<RemoteChange>, last_sync_id: u64, has_more: bool) -> Self {
        Self {
            changes,
            last_sync_id,
            has_more,
        }
    }

    /// Creates an empty page at the given cursor.
    pub fn empty(last_sync_id: u64) -> Self {
        Self::new(Vec::new(), last_sync_id, false)
    }
}

/// One locally originated change as submitted to the push endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUpload {
    /// Entity type of the affected record.
    pub entity_type: String,
    /// Entity id of the affected record.
    pub entity_id: String,
    /// The mutation kind.
    pub operation: ChangeOp,
    /// The client's version for this entity at mutation time.
    pub version: u64,
    /// JSON-encoded entity payload. Omitted for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Request body of the push endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Changes in the order they were recorded locally.
    pub changes: Vec<ChangeUpload>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(changes: Vec<ChangeUpload>) -> Self {
        Self { changes }
    }
}

/// Per-change result of a push.
///
/// Exactly one of success, conflict, or failure (neither flag set) holds.
/// A conflict means the server's version for the entity is strictly greater
/// than the version the client submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    /// Entity id the outcome refers to.
    pub entity_id: String,
    /// The change was accepted and applied by the server.
    pub success: bool,
    /// Server-side rejection detail for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// The change lost a version race.
    pub conflict: bool,
    /// The server's current version for the entity, reported on conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<u64>,
}

impl PushOutcome {
    /// Creates a success outcome.
    pub fn success(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            success: true,
            error_message: None,
            conflict: false,
            server_version: None,
        }
    }

    /// Creates a conflict outcome carrying the server's current version.
    pub fn conflict(entity_id: impl Into<String>, server_version: u64) -> Self {
        Self {
            entity_id: entity_id.into(),
            success: false,
            error_message: None,
            conflict: true,
            server_version: Some(server_version),
        }
    }

    /// Creates a failure outcome (rejected, neither success nor conflict).
    pub fn failure(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            success: false,
            error_message: Some(message.into()),
            conflict: false,
            server_version: None,
        }
    }

    /// Returns true for the failure case (neither success nor conflict).
    pub fn is_failure(&self) -> bool {
        !self.success && !self.conflict
    }
}

/// Response body of the push endpoint.
///
/// `results` has the same length and order as the request's `changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Per-change outcomes, positionally aligned with the request.
    pub results: Vec<PushOutcome>,
    /// Number of accepted changes.
    pub success_count: u32,
    /// Number of changes that were not accepted (conflicts included).
    pub failure_count: u32,
}

impl PushResponse {
    /// Creates a response from outcomes, deriving the counts.
    pub fn from_outcomes(results: Vec<PushOutcome>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count() as u32;
        let failure_count = results.len() as u32 - success_count;
        Self {
            results,
            success_count,
            failure_count,
        }
    }
}
