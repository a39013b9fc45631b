//! Sync server facade.

use crate::changelog::ServerChangeLog;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::SyncHandler;
use carnet_sync_protocol::{ChangesResponse, PushRequest, PushResponse};
use std::sync::Arc;
use tracing::warn;

/// The sync server.
///
/// Wraps the change log and handlers behind the endpoint contract. In a
/// deployment the embedding application exposes real HTTP routes that call
/// [`handle_changes`](SyncServer::handle_changes) and
/// [`handle_push`](SyncServer::handle_push);
/// [`handle_http`](SyncServer::handle_http) performs the same dispatch for
/// in-process (loopback) clients.
pub struct SyncServer {
    handler: SyncHandler,
    log: Arc<ServerChangeLog>,
}

impl SyncServer {
    /// Creates a server with a fresh change log.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_log(config, Arc::new(ServerChangeLog::new()))
    }

    /// Creates a server over an existing change log.
    pub fn with_log(config: ServerConfig, log: Arc<ServerChangeLog>) -> Self {
        let handler = SyncHandler::new(config, Arc::clone(&log));
        Self { handler, log }
    }

    /// Handles a changes request.
    pub fn handle_changes(&self, since: u64) -> ChangesResponse {
        self.handler.handle_changes(since)
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> Result<PushResponse, ServerError> {
        self.handler.handle_push(request)
    }

    /// Returns the highest assigned log id.
    pub fn cursor(&self) -> u64 {
        self.log.cursor()
    }

    /// Returns the number of logged changes.
    pub fn change_count(&self) -> usize {
        self.log.len()
    }

    /// HTTP-shaped dispatch: routes a request to the matching handler and
    /// encodes the response as JSON. Returns the status code and body.
    pub fn handle_http(&self, method: &str, path_and_query: &str, body: &[u8]) -> (u16, Vec<u8>) {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));

        match (method, path) {
            ("GET", "/api/sync/changes") => match parse_since(query) {
                Ok(since) => json_response(&self.handle_changes(since)),
                Err(message) => bad_request(message),
            },
            ("POST", "/api/sync/push") => {
                let request: PushRequest = match serde_json::from_slice(body) {
                    Ok(request) => request,
                    Err(e) => return bad_request(format!("malformed body: {e}")),
                };
                match self.handle_push(request) {
                    Ok(response) => json_response(&response),
                    Err(ServerError::InvalidRequest(message)) => bad_request(message),
                }
            }
            _ => (404, b"not found".to_vec()),
        }
    }
}

fn parse_since(query: &str) -> Result<u64, String> {
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("since=") {
            return value
                .parse::<u64>()
                .map_err(|e| format!("invalid since parameter: {e}"));
        }
    }
    Ok(0)
}

fn json_response<T: serde::Serialize>(value: &T) -> (u16, Vec<u8>) {
    match serde_json::to_vec(value) {
        Ok(body) => (200, body),
        Err(e) => {
            warn!(error = %e, "response encoding failed");
            (500, e.to_string().into_bytes())
        }
    }
}

fn bad_request(message: String) -> (u16, Vec<u8>) {
    (400, message.into_bytes())
}
