//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use carnet_sync_protocol::{ChangesResponse, PushRequest, PushResponse};

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, loopback, mock for testing). Authentication is the
/// backing client's concern; the engine never sees credentials.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetches server changes strictly after `since`.
    async fn fetch_changes(&self, since: u64) -> SyncResult<ChangesResponse>;

    /// Pushes a batch of local changes.
    async fn push_changes(&self, request: &PushRequest) -> SyncResult<PushResponse>;
}

/// A mock transport replaying scripted responses, for testing.
///
/// Responses are consumed in order. An exhausted changes queue yields an
/// empty page at the requested cursor; an exhausted push queue yields a
/// protocol error.
#[derive(Default)]
pub struct MockTransport {
    changes_responses: std::sync::Mutex<std::collections::VecDeque<SyncResult<ChangesResponse>>>,
    push_responses: std::sync::Mutex<std::collections::VecDeque<SyncResult<PushResponse>>>,
    pushed: std::sync::Mutex<Vec<PushRequest>>,
    fetched_since: std::sync::Mutex<Vec<u64>>,
}

impl MockTransport {
    /// Creates a new mock transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a changes response.
    pub fn enqueue_changes(&self, response: SyncResult<ChangesResponse>) {
        self.changes_responses.lock().unwrap().push_back(response);
    }

    /// Queues a push response.
    pub fn enqueue_push(&self, response: SyncResult<PushResponse>) {
        self.push_responses.lock().unwrap().push_back(response);
    }

    /// Returns the push requests sent so far.
    pub fn pushed_requests(&self) -> Vec<PushRequest> {
        self.pushed.lock().unwrap().clone()
    }

    /// Returns the `since` cursors of the fetches sent so far.
    pub fn fetched_cursors(&self) -> Vec<u64> {
        self.fetched_since.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn fetch_changes(&self, since: u64) -> SyncResult<ChangesResponse> {
        self.fetched_since.lock().unwrap().push(since);
        self.changes_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ChangesResponse::empty(since)))
    }

    async fn push_changes(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.pushed.lock().unwrap().push(request.clone());
        self.push_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock push response queued".into())))
    }
}
