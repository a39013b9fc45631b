//! Connectivity monitoring.
//!
//! The monitor exposes one uniform contract over platform-specific
//! acquisition strategies: an observable boolean reachability signal with a
//! start/stop lifecycle. Subscribers see the current value immediately and
//! a new value on every transition. The backing strategy is selected at
//! process start:
//!
//! - [`ManualMonitor`] adapts an external signal (an OS reachability
//!   callback, or a test harness) by letting the owner set the value.
//! - [`PollingMonitor`] actively probes at a fixed interval, for hosts with
//!   no passive OS-level signal. Polling is a deliberate concession on those
//!   hosts, not the general mechanism.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Observable reachability signal.
///
/// The engine consumes only the receiver; implementations own acquisition.
pub trait Reachability {
    /// Subscribes to the signal. The receiver holds the current value.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A single reachability check.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
    /// Returns true if the network is currently reachable.
    async fn probe(&self) -> bool;
}

/// Probes reachability by opening a TCP connection.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe against `addr` (host:port) with the given timeout.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self) -> bool {
        matches!(
            tokio::time::timeout(
                self.timeout,
                tokio::net::TcpStream::connect(self.addr.as_str()),
            )
            .await,
            Ok(Ok(_))
        )
    }
}

/// Reachability monitor backed by active polling.
///
/// Pessimistic (`false`) until [`start`](PollingMonitor::start) runs the
/// first probe.
pub struct PollingMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    interval: Duration,
    tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl PollingMonitor {
    /// Creates a monitor polling `probe` every `interval`.
    pub fn new(probe: impl ReachabilityProbe, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            probe: Arc::new(probe),
            interval,
            tx,
            task: None,
        }
    }

    /// Starts polling. The current value is emitted immediately, then a new
    /// value on every transition. A no-op if already started.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            // Initial current value, emitted unconditionally.
            let initial = probe.probe().await;
            debug!(reachable = initial, "connectivity monitor started");
            let _ = tx.send(initial);

            loop {
                tokio::time::sleep(interval).await;
                let current = probe.probe().await;
                let transitioned = tx.send_if_modified(|value| {
                    if *value != current {
                        *value = current;
                        true
                    } else {
                        false
                    }
                });
                if transitioned {
                    info!(reachable = current, "connectivity changed");
                }
            }
        }));
    }

    /// Stops polling. Subscribers keep the last observed value and receive
    /// no further emissions.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("connectivity monitor stopped");
        }
    }
}

impl Reachability for PollingMonitor {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Drop for PollingMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reachability monitor driven by an external signal.
pub struct ManualMonitor {
    tx: watch::Sender<bool>,
}

impl ManualMonitor {
    /// Creates a monitor with the given initial value.
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Reports the current reachability. Emits only on transition.
    pub fn set_reachable(&self, reachable: bool) {
        let transitioned = self.tx.send_if_modified(|value| {
            if *value != reachable {
                *value = reachable;
                true
            } else {
                false
            }
        });
        if transitioned {
            info!(reachable, "connectivity changed");
        }
    }
}

impl Reachability for ManualMonitor {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
