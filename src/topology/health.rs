//! # Health Monitor
//!
//! Background task that re-probes every connection on a fixed interval.
//!
//! The task holds only a `Weak` reference to its topology, so it never keeps
//! the topology alive. Stopping is deterministic: the active flag is cleared,
//! any cycle already running is waited out through the cycle gate, and the
//! task is woken and aborted. No probe runs after [`HealthMonitor::stop`]
//! returns.

use super::connector::ConnectionTopology;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// State shared between the monitor handle and its task
#[derive(Debug)]
struct MonitorState {
    active: AtomicBool,
    shutdown_notify: Notify,
    /// Held for the duration of one probe cycle
    cycle_gate: Mutex<()>,
}

#[derive(Debug)]
pub struct HealthMonitor {
    state: Arc<MonitorState>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl HealthMonitor {
    /// Spawn the monitor on the current tokio runtime. Returns `None` outside a
    /// runtime; the caller can still run cycles by hand.
    pub(crate) fn spawn(topology: Weak<ConnectionTopology>, interval: Duration) -> Option<Self> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No tokio runtime available; health monitor not started");
                return None;
            }
        };

        let state = Arc::new(MonitorState {
            active: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
            cycle_gate: Mutex::new(()),
        });

        let task_state = Arc::clone(&state);
        let handle = runtime.spawn(async move {
            run_monitor_loop(topology, task_state, interval).await;
        });

        info!(interval_ms = interval.as_millis() as u64, "🩺 HEALTH_MONITOR: Started");
        Some(Self {
            state,
            handle: Some(handle),
            interval,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the monitor; safe to call more than once
    pub fn stop(&mut self) {
        if self.state.active.swap(false, Ordering::AcqRel) {
            // Wait for an in-flight cycle to finish before returning
            drop(self.state.cycle_gate.lock());
            self.state.shutdown_notify.notify_waiters();
            info!("🩺 HEALTH_MONITOR: Stopped");
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_monitor_loop(topology: Weak<ConnectionTopology>, state: Arc<MonitorState>, interval: Duration) {
    while state.active.load(Ordering::Acquire) {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = state.shutdown_notify.notified() => {
                debug!("Health monitor shutdown notification received");
                break;
            }
        }

        let Some(topology) = topology.upgrade() else {
            debug!("Topology dropped; health monitor exiting");
            break;
        };

        let _gate = state.cycle_gate.lock();
        if !state.active.load(Ordering::Acquire) {
            break;
        }
        topology.run_health_check();
    }
}
