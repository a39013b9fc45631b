//! # Carnet Sync Engine
//!
//! Offline-first synchronization engine for Carnet clients.
//!
//! This crate provides:
//! - Local store capability behind a fair access lock
//! - Connectivity monitoring (polling or externally driven)
//! - Pull and push pipelines against the server's change feed
//! - The sync coordinator state machine (idle → pulling → pushing → idle)
//! - Retry with exponential backoff and an observable sync status
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** cycle:
//! 1. Pull remote changes until the server reports none remain
//! 2. Apply them to the local store under the access lock
//! 3. Push pending local changes and apply the per-change outcomes
//!
//! Cycles never overlap; triggers arriving mid-cycle coalesce into at most
//! one queued re-run.
//!
//! ## Key Invariants
//!
//! - The server is the single source of ordering truth
//! - The sync cursor only advances, and never past the last fully-applied
//!   remote change
//! - A pending change is confirmed, marked conflicted, or retained for
//!   retry; it is never silently dropped
//! - Every local-store mutation happens under the access lock

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod http;
mod lock;
mod monitor;
pub mod pull;
pub mod push;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{SyncEngine, SyncReport, SyncState, SyncStats, SyncStatus};
pub use error::{StoreError, SyncError, SyncResult};
pub use http::{HttpClient, HttpError, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use lock::{StoreGuard, StoreLock};
pub use monitor::{ManualMonitor, PollingMonitor, Reachability, ReachabilityProbe, TcpProbe};
pub use pull::PullOutcome;
pub use push::PushSummary;
pub use store::{MemoryStore, SyncStore};
pub use transport::{MockTransport, SyncTransport};

#[cfg(feature = "reqwest-client")]
pub use http::ReqwestClient;
