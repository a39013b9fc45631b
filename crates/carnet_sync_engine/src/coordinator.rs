//! Sync coordinator state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::lock::StoreLock;
use crate::pull;
use crate::push::{self, PushSummary};
use crate::store::SyncStore;
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// At rest, awaiting a trigger.
    Idle,
    /// Applying server changes to the local store.
    Pulling,
    /// Submitting pending local changes.
    Pushing,
    /// Connectivity is down; triggers are ignored until it returns.
    Offline,
}

impl SyncState {
    /// Returns true while a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Pulling | SyncState::Pushing)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Pulling => write!(f, "pulling"),
            SyncState::Pushing => write!(f, "pushing"),
            SyncState::Offline => write!(f, "offline"),
        }
    }
}

/// Observable sync status for UI consumption.
///
/// Carries the most recent terminal error and the unresolved-conflict
/// count; transient failures that are still being retried are not surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current state.
    pub state: SyncState,
    /// Most recent terminal error, cleared by the next successful cycle.
    pub last_error: Option<String>,
    /// Number of changes held back on unresolved conflicts.
    pub pending_conflicts: usize,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_error: None,
            pending_conflicts: 0,
        }
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of completed cycles.
    pub cycles_completed: u64,
    /// Total number of remote changes applied.
    pub changes_pulled: u64,
    /// Total number of local changes confirmed.
    pub changes_pushed: u64,
    /// Total number of conflicts surfaced.
    pub conflicts_seen: u64,
    /// Total number of cycle retries.
    pub retries: u64,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    /// Remote changes applied.
    pub pulled: u64,
    /// Local changes confirmed by the server.
    pub confirmed: u64,
    /// Local changes that conflicted.
    pub conflicts: u64,
    /// Local changes rejected and left pending.
    pub failures: u64,
    /// Duration of the cycle.
    pub duration: Duration,
}

struct AutoSyncHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// The process-scoped sync engine.
///
/// Constructed once at startup and injected into consumers. Runs one cycle
/// at a time (pull until exhausted, then push); triggers arriving mid-cycle
/// coalesce into at most one queued re-run. The auto-sync task reacts to
/// connectivity transitions, manual triggers, and the optional periodic
/// timer, and retries transient failures with capped exponential backoff.
pub struct SyncEngine<T: SyncTransport, S: SyncStore> {
    config: SyncConfig,
    transport: Arc<T>,
    lock: StoreLock<S>,
    connectivity: watch::Receiver<bool>,
    status: watch::Sender<SyncStatus>,
    stats: RwLock<SyncStats>,
    trigger: Notify,
    cycle_flight: Mutex<()>,
    failing_cycles: AtomicU32,
    escalated: AtomicBool,
    auto: parking_lot::Mutex<Option<AutoSyncHandle>>,
}

impl<T, S> SyncEngine<T, S>
where
    T: SyncTransport + 'static,
    S: SyncStore + 'static,
{
    /// Creates a new sync engine.
    ///
    /// `connectivity` is the monitor's signal; its current value decides the
    /// initial state (`Idle` or `Offline`).
    pub fn new(
        config: SyncConfig,
        transport: T,
        lock: StoreLock<S>,
        connectivity: watch::Receiver<bool>,
    ) -> Self {
        let initial = if *connectivity.borrow() {
            SyncState::Idle
        } else {
            SyncState::Offline
        };
        let (status, _) = watch::channel(SyncStatus {
            state: initial,
            ..Default::default()
        });

        Self {
            config,
            transport: Arc::new(transport),
            lock,
            connectivity,
            status,
            stats: RwLock::new(SyncStats::default()),
            trigger: Notify::new(),
            cycle_flight: Mutex::new(()),
            failing_cycles: AtomicU32::new(0),
            escalated: AtomicBool::new(false),
            auto: parking_lot::Mutex::new(None),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status changes.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        self.status.borrow().state
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Requests a sync cycle from the auto-sync task.
    ///
    /// Triggers coalesce: at most one re-run is queued while a cycle is in
    /// flight. A manual trigger also resets the failing-cycle escalation.
    pub fn trigger_sync_now(&self) {
        self.failing_cycles.store(0, Ordering::SeqCst);
        self.escalated.store(false, Ordering::SeqCst);
        self.trigger.notify_one();
    }

    /// Runs one sync cycle and returns its report.
    ///
    /// Serialized against the auto-sync task: cycles never overlap.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        if !*self.connectivity.borrow() {
            return Err(SyncError::Offline);
        }

        let result = self.run_cycle().await;
        if let Err(error) = &result {
            self.publish_error(error);
        }
        result
    }

    /// Starts the auto-sync background task. A no-op if already running.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let mut auto = self.auto.lock();
        if auto.is_some() {
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.run_loop(shutdown_rx).await });
        *auto = Some(AutoSyncHandle {
            shutdown: shutdown_tx,
            task,
        });
        info!("auto sync started");
    }

    /// Stops the auto-sync task, cancelling any in-flight request.
    ///
    /// A cancelled cycle leaves the store and cursor consistent: remote
    /// changes already applied stay applied, nothing is rolled back.
    pub async fn stop_auto_sync(&self) {
        let handle = self.auto.lock().take();
        if let Some(AutoSyncHandle { shutdown, task }) = handle {
            let _ = shutdown.send(true);
            let _ = task.await;
            info!("auto sync stopped");
        }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut connectivity = self.connectivity.clone();
        let mut connectivity_open = true;
        let periodic = self.config.sync_interval.is_some();
        let mut ticker = tokio::time::interval(
            self.config
                .sync_interval
                .unwrap_or_else(|| Duration::from_secs(3600)),
        );
        let mut retry_at: Option<tokio::time::Instant> = None;
        let mut attempt: u32 = 0;

        if *connectivity.borrow() {
            // Catch up on whatever accumulated while the engine was down.
            self.trigger.notify_one();
        } else {
            self.set_state(SyncState::Offline);
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,

                changed = connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        // Monitor dropped; keep the last observed value.
                        connectivity_open = false;
                        continue;
                    }
                    if *connectivity.borrow() {
                        info!("connectivity regained");
                        attempt = 0;
                        retry_at = None;
                        self.failing_cycles.store(0, Ordering::SeqCst);
                        self.escalated.store(false, Ordering::SeqCst);
                        self.set_state(SyncState::Idle);
                        self.trigger.notify_one();
                    } else {
                        info!("connectivity lost");
                        retry_at = None;
                        self.set_state(SyncState::Offline);
                    }
                }

                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(tokio::time::Instant::now)),
                    if retry_at.is_some() =>
                {
                    retry_at = None;
                    self.trigger.notify_one();
                }

                _ = ticker.tick(),
                    if periodic && !self.escalated.load(Ordering::SeqCst) =>
                {
                    debug!("periodic sync tick");
                    self.trigger.notify_one();
                }

                _ = self.trigger.notified() => {
                    if !*connectivity.borrow() {
                        debug!("trigger ignored while offline");
                        continue;
                    }

                    let outcome = tokio::select! {
                        _ = shutdown.changed() => {
                            debug!("cycle cancelled by shutdown");
                            self.set_state(self.rest_state());
                            break;
                        }
                        outcome = self.run_cycle() => outcome,
                    };

                    match outcome {
                        Ok(report) => {
                            attempt = 0;
                            retry_at = self.handle_report(&report);
                        }
                        Err(error) if error.is_retryable() => {
                            attempt += 1;
                            self.stats.write().retries += 1;
                            if attempt < self.config.retry.max_attempts {
                                let delay = self.config.retry.delay_for_attempt(attempt);
                                debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure, retrying");
                                retry_at = Some(tokio::time::Instant::now() + delay);
                            } else {
                                warn!(error = %error, attempts = attempt, "sync failed after retries");
                                attempt = 0;
                                self.publish_error(&error);
                            }
                        }
                        Err(error) => {
                            attempt = 0;
                            warn!(error = %error, "sync failed");
                            self.publish_error(&error);
                        }
                    }
                }
            }
        }
    }

    /// Decides follow-up scheduling after a completed cycle.
    ///
    /// Rejected changes are resubmitted next cycle; once they persist across
    /// the configured number of consecutive cycles, automatic rescheduling
    /// stops and a terminal error is surfaced instead.
    fn handle_report(&self, report: &SyncReport) -> Option<tokio::time::Instant> {
        if report.failures == 0 {
            self.failing_cycles.store(0, Ordering::SeqCst);
            return None;
        }

        let failing = self.failing_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        if failing >= self.config.max_failing_cycles {
            self.escalated.store(true, Ordering::SeqCst);
            let message = format!(
                "{} changes still failing after {} cycles",
                report.failures, failing
            );
            warn!(%message, "escalating persistent push failures");
            self.status.send_modify(|s| s.last_error = Some(message));
            None
        } else {
            let delay = self.config.retry.delay_for_attempt(failing);
            debug!(failing, delay_ms = delay.as_millis() as u64, "rescheduling for rejected changes");
            Some(tokio::time::Instant::now() + delay)
        }
    }

    async fn run_cycle(&self) -> SyncResult<SyncReport> {
        // Single-flight: concurrent callers queue here, never overlap.
        let _flight = self.cycle_flight.lock().await;
        let started = Instant::now();
        debug!("sync cycle started");

        match self.run_phases().await {
            Ok((pulled, summary)) => {
                let pending_conflicts = {
                    let mut store = self.lock.acquire().await?;
                    store.conflicted_count().await?
                };

                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.changes_pulled += pulled;
                    stats.changes_pushed += summary.confirmed;
                    stats.conflicts_seen += summary.conflicts;
                }

                let report = SyncReport {
                    pulled,
                    confirmed: summary.confirmed,
                    conflicts: summary.conflicts,
                    failures: summary.failures,
                    duration: started.elapsed(),
                };

                let rest = self.rest_state();
                self.status.send_modify(|s| {
                    s.state = rest;
                    s.last_error = None;
                    s.pending_conflicts = pending_conflicts;
                });

                info!(
                    pulled = report.pulled,
                    confirmed = report.confirmed,
                    conflicts = report.conflicts,
                    failures = report.failures,
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync cycle complete"
                );
                Ok(report)
            }
            Err(error) => {
                self.set_state(self.rest_state());
                Err(error)
            }
        }
    }

    async fn run_phases(&self) -> SyncResult<(u64, PushSummary)> {
        // All pulls complete before any push so pushes are evaluated against
        // the freshest known server state.
        self.set_state(SyncState::Pulling);
        let (pulled, _cursor) = pull::pull_all(self.transport.as_ref(), &self.lock).await?;

        self.set_state(SyncState::Pushing);
        let summary = push::push_pending(self.transport.as_ref(), &self.lock).await?;

        Ok((pulled, summary))
    }

    fn rest_state(&self) -> SyncState {
        if *self.connectivity.borrow() {
            SyncState::Idle
        } else {
            SyncState::Offline
        }
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_if_modified(|s| {
            if s.state != state {
                s.state = state;
                true
            } else {
                false
            }
        });
    }

    fn publish_error(&self, error: &SyncError) {
        let rest = self.rest_state();
        self.status.send_modify(|s| {
            s.state = rest;
            s.last_error = Some(error.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::monitor::{ManualMonitor, Reachability};
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;
    use async_trait::async_trait;
    use carnet_sync_protocol::{
        ChangeOp, ChangesResponse, PushOutcome, PushRequest, PushResponse, RemoteChange,
    };

    fn engine_with(
        config: SyncConfig,
        transport: MockTransport,
        store: MemoryStore,
        online: bool,
    ) -> (Arc<SyncEngine<MockTransport, MemoryStore>>, ManualMonitor) {
        let monitor = ManualMonitor::new(online);
        let lock = StoreLock::new(store, Duration::from_secs(1));
        let engine = Arc::new(SyncEngine::new(config, transport, lock, monitor.subscribe()));
        (engine, monitor)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn initial_state_follows_monitor() {
        let (engine, _monitor) = engine_with(
            SyncConfig::new(),
            MockTransport::new(),
            MemoryStore::new(),
            false,
        );
        assert_eq!(engine.state(), SyncState::Offline);

        let (engine, _monitor) = engine_with(
            SyncConfig::new(),
            MockTransport::new(),
            MemoryStore::new(),
            true,
        );
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn sync_now_pulls_then_pushes() {
        let transport = MockTransport::new();
        transport.enqueue_changes(Ok(ChangesResponse::new(
            vec![RemoteChange::upsert(3, "Student", "s9", ChangeOp::Create, 1, "{}")],
            3,
            false,
        )));
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::success(
            "s1",
        )])));

        let mut store = MemoryStore::new();
        store.record("Student", "s1", ChangeOp::Create, Some("{}".into()));

        let (engine, _monitor) = engine_with(SyncConfig::new(), transport, store, true);

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(report.failures, 0);

        let status = engine.status();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.last_error, None);
        assert_eq!(status.pending_conflicts, 0);

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.changes_pulled, 1);
        assert_eq!(stats.changes_pushed, 1);
    }

    #[tokio::test]
    async fn sync_now_while_offline_is_rejected() {
        let (engine, _monitor) = engine_with(
            SyncConfig::new(),
            MockTransport::new(),
            MemoryStore::new(),
            false,
        );
        assert!(matches!(engine.sync_now().await, Err(SyncError::Offline)));
    }

    #[tokio::test]
    async fn conflict_count_reaches_status() {
        let transport = MockTransport::new();
        transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::conflict(
            "s1", 4,
        )])));

        let mut store = MemoryStore::new();
        store.record("Student", "s1", ChangeOp::Update, Some("{}".into()));

        let (engine, _monitor) = engine_with(SyncConfig::new(), transport, store, true);
        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(engine.status().pending_conflicts, 1);
        assert_eq!(engine.stats().conflicts_seen, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_regained_runs_exactly_one_cycle() {
        // Scenario: monitor flips false→true while the coordinator is
        // offline; exactly one cycle starts, not zero, not two.
        let transport = MockTransport::new();
        let (engine, monitor) = engine_with(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            transport,
            MemoryStore::new(),
            false,
        );

        engine.start_auto_sync();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.state(), SyncState::Offline);
        assert_eq!(engine.stats().cycles_completed, 0);

        monitor.set_reachable(true);
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed == 1).await;

        // Settle: no second cycle appears.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.stats().cycles_completed, 1);
        assert_eq!(engine.transport.fetched_cursors().len(), 1);
        assert_eq!(engine.state(), SyncState::Idle);

        engine.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_lost_goes_offline() {
        let (engine, monitor) = engine_with(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            MockTransport::new(),
            MemoryStore::new(),
            true,
        );
        engine.start_auto_sync();

        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed == 1).await;

        monitor.set_reachable(false);
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.state() == SyncState::Offline).await;

        // Triggers while offline are ignored.
        engine.trigger_sync_now();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.stats().cycles_completed, 1);

        engine.stop_auto_sync().await;
    }

    /// Transport that blocks fetches until released.
    struct GatedTransport {
        inner: MockTransport,
        gate: tokio::sync::Semaphore,
    }

    impl GatedTransport {
        fn new(inner: MockTransport) -> Self {
            Self {
                inner,
                gate: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl SyncTransport for GatedTransport {
        async fn fetch_changes(&self, since: u64) -> SyncResult<ChangesResponse> {
            let permit = self.gate.acquire().await.map_err(|_| SyncError::Cancelled)?;
            permit.forget();
            self.inner.fetch_changes(since).await
        }

        async fn push_changes(&self, request: &PushRequest) -> SyncResult<PushResponse> {
            self.inner.push_changes(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_cycle_coalesce_to_one_rerun() {
        let transport = GatedTransport::new(MockTransport::new());

        let monitor = ManualMonitor::new(true);
        let lock = StoreLock::new(MemoryStore::new(), Duration::from_secs(1));
        let engine = Arc::new(SyncEngine::new(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            transport,
            lock,
            monitor.subscribe(),
        ));

        engine.start_auto_sync();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // First cycle is in flight, blocked on the gate.
        assert_eq!(engine.state(), SyncState::Pulling);

        // Three triggers while syncing: they collapse into one re-run.
        engine.trigger_sync_now();
        engine.trigger_sync_now();
        engine.trigger_sync_now();

        engine.transport.gate.add_permits(8);
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.state() == SyncState::Idle).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.stats().cycles_completed, 2);

        engine.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_with_backoff() {
        let transport = MockTransport::new();
        transport.enqueue_changes(Err(SyncError::transport_retryable("connection reset")));
        // Second attempt succeeds (empty page default).

        let (engine, _monitor) = engine_with(
            SyncConfig::new().with_retry(
                RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(100))
                    .with_max_delay(Duration::from_millis(100)),
            ),
            transport,
            MemoryStore::new(),
            true,
        );

        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed == 1).await;

        let stats = engine.stats();
        assert_eq!(stats.retries, 1);
        // The retried cycle succeeded; no terminal error surfaced.
        assert_eq!(engine.status().last_error, None);

        engine.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_terminal_error() {
        let transport = MockTransport::new();
        for _ in 0..2 {
            transport.enqueue_changes(Err(SyncError::transport_retryable("connection reset")));
        }

        let (engine, _monitor) = engine_with(
            SyncConfig::new().with_retry(
                RetryConfig::new(2)
                    .with_initial_delay(Duration::from_millis(50))
                    .with_max_delay(Duration::from_millis(50)),
            ),
            transport,
            MemoryStore::new(),
            true,
        );

        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.status().last_error.is_some()).await;

        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
        assert!(engine
            .status()
            .last_error
            .unwrap()
            .contains("transport error"));

        engine.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failures_escalate_and_pause_rescheduling() {
        let transport = MockTransport::new();
        for _ in 0..8 {
            transport.enqueue_push(Ok(PushResponse::from_outcomes(vec![PushOutcome::failure(
                "s1",
                "validation failed",
            )])));
        }

        let mut store = MemoryStore::new();
        store.record("Student", "s1", ChangeOp::Create, Some("{}".into()));

        let (engine, _monitor) = engine_with(
            SyncConfig::new()
                .with_retry(RetryConfig::no_retry().with_initial_delay(Duration::from_millis(50)))
                .with_max_failing_cycles(2),
            transport,
            store,
            true,
        );

        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.status().last_error.is_some()).await;

        assert!(engine.status().last_error.unwrap().contains("still failing"));
        assert_eq!(engine.stats().cycles_completed, 2);

        // Escalated: no further automatic cycles.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(engine.stats().cycles_completed, 2);

        // A manual trigger resets the escalation and runs again.
        engine.trigger_sync_now();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed >= 3).await;

        engine.stop_auto_sync().await;
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_cycle() {
        let transport = GatedTransport::new(MockTransport::new());
        let monitor = ManualMonitor::new(true);
        let lock = StoreLock::new(MemoryStore::new(), Duration::from_secs(1));
        let engine = Arc::new(SyncEngine::new(
            SyncConfig::new(),
            transport,
            lock,
            monitor.subscribe(),
        ));

        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.state() == SyncState::Pulling).await;

        // The fetch is blocked on the gate forever; stop must not hang.
        tokio::time::timeout(Duration::from_secs(2), engine.stop_auto_sync())
            .await
            .expect("stop_auto_sync hung on an in-flight request");

        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_timer_drives_cycles() {
        let (engine, _monitor) = engine_with(
            SyncConfig::new()
                .with_retry(RetryConfig::no_retry())
                .with_sync_interval(Duration::from_secs(60)),
            MockTransport::new(),
            MemoryStore::new(),
            true,
        );

        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed >= 1).await;

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert!(engine.stats().cycles_completed >= 3);

        engine.stop_auto_sync().await;
    }

    #[tokio::test]
    async fn start_auto_sync_twice_is_noop() {
        let (engine, _monitor) = engine_with(
            SyncConfig::new().with_retry(RetryConfig::no_retry()),
            MockTransport::new(),
            MemoryStore::new(),
            true,
        );

        engine.start_auto_sync();
        engine.start_auto_sync();
        let engine_clone = Arc::clone(&engine);
        wait_for(move || engine_clone.stats().cycles_completed >= 1).await;
        engine.stop_auto_sync().await;

        // Exactly one task ran; stopping again is a no-op.
        engine.stop_auto_sync().await;
    }
}
