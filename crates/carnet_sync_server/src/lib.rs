//! # Carnet Sync Server
//!
//! Reference implementation of the two Carnet sync endpoints:
//!
//! - `GET /api/sync/changes?since={lastSyncId}`
//! - `POST /api/sync/push`
//!
//! The server keeps an append-only change log with strictly increasing log
//! ids and a per-entity version map for conflict detection. It exposes typed
//! handlers plus an HTTP-shaped dispatch for loopback use; wiring it behind
//! a real listener (and authentication) is the embedding application's
//! concern.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changelog;
mod config;
mod error;
mod handler;
mod server;

pub use changelog::ServerChangeLog;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::SyncHandler;
pub use server::SyncServer;
