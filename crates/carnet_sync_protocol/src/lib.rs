//! # Carnet Sync Protocol
//!
//! Sync wire types and the client change log for Carnet.
//!
//! This crate provides:
//! - [`ChangeOp`] for the three replicated mutation kinds
//! - JSON messages for the changes and push endpoints
//! - [`ChangeLog`] for tracking pending local mutations and the sync cursor
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changelog;
mod messages;
mod operation;

pub use changelog::{ChangeLog, ChangeState, PendingChange};
pub use messages::{
    ChangeUpload, ChangesResponse, PushOutcome, PushRequest, PushResponse, RemoteChange,
};
pub use operation::ChangeOp;
