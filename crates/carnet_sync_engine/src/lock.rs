//! Store access lock.
//!
//! Every read-modify-write sequence against the local store goes through a
//! scoped acquisition of [`StoreLock`]: the pull and push pipelines, and the
//! UI-driven write path sharing the same store handle. The lock is fair
//! (first-come-first-served, so a long sync cycle cannot starve UI writes)
//! and non-reentrant: a pipeline must not acquire it again while holding a
//! guard. Because the guard is held across suspension points, interleaved
//! asynchronous operations can never observe a partially-applied batch.

use crate::error::{SyncError, SyncResult};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Fair, scoped mutual exclusion over the local store.
pub struct StoreLock<S> {
    inner: Arc<Mutex<S>>,
    timeout: Duration,
}

impl<S> StoreLock<S> {
    /// Wraps a store in a lock with the given acquisition timeout.
    pub fn new(store: S, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            timeout,
        }
    }

    /// Acquires the lock, waiting at most the configured timeout.
    ///
    /// The guard releases the lock on every exit path, including panics and
    /// cancellation. Expiry surfaces as [`SyncError::LockTimeout`], the
    /// diagnostic for a stuck prior operation; the caller aborts the cycle
    /// and retries later.
    pub async fn acquire(&self) -> SyncResult<StoreGuard<'_, S>> {
        match tokio::time::timeout(self.timeout, self.inner.lock()).await {
            Ok(guard) => Ok(StoreGuard(guard)),
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "store lock timed out");
                Err(SyncError::LockTimeout)
            }
        }
    }
}

impl<S> Clone for StoreLock<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

/// Exclusive access to the store for one unit of work.
pub struct StoreGuard<'a, S>(MutexGuard<'a, S>);

impl<S> Deref for StoreGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

impl<S> DerefMut for StoreGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}
