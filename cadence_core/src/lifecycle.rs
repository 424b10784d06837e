//! Lifecycle tracking for the fixed set of background workers.
//!
//! Every lifecycle-managed component must pass through `Starting` before it
//! can report `Active`; a worker that skips the transition is ignored with a
//! warning instead of silently accepted. `Errored` is retryable and
//! re-enters `Starting`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Worker name: the virtual clock.
pub const WORKER_CLOCK: &str = "virtual-clock";
/// Worker name: the cycle orchestrator drive loop.
pub const WORKER_ORCHESTRATOR: &str = "orchestrator";
/// Worker name: the dispatch queue consumer.
pub const WORKER_DISPATCH: &str = "dispatch";

/// The fixed worker set tracked by the engine.
pub const DEFAULT_WORKERS: [&str; 3] = [WORKER_CLOCK, WORKER_ORCHESTRATOR, WORKER_DISPATCH];

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Never started (initial state)
    Stopped,
    /// Start requested, init in progress
    Starting,
    /// Initialized and doing work
    Active,
    /// Failed; retryable via a new start request
    Errored,
}

/// Status record for one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    /// Worker name
    pub name: String,
    /// Current lifecycle state
    pub state: WorkerState,
    /// Milliseconds since context start of the last reported activity
    pub last_activity_ms: u64,
    /// Cumulative runtime/delivery error count
    pub error_count: u32,
}

/// Tracks start/active/error state for a fixed set of named workers.
///
/// `report_starting`, `report_active`, and `report_error` are the only
/// mutators; everything else is a read-only snapshot. All methods take the
/// current context time as a plain argument so the monitor itself stays
/// free of the environment seam.
pub struct LifecycleMonitor {
    workers: Mutex<BTreeMap<String, WorkerStatus>>,
}

impl LifecycleMonitor {
    /// Creates a monitor for the given fixed worker set, all `Stopped`.
    pub fn new(names: &[&str]) -> Self {
        let workers = names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    WorkerStatus {
                        name: name.to_string(),
                        state: WorkerState::Stopped,
                        last_activity_ms: 0,
                        error_count: 0,
                    },
                )
            })
            .collect();
        Self {
            workers: Mutex::new(workers),
        }
    }

    /// Records a start request for a worker.
    pub fn report_starting(&self, name: &str, now: Duration) {
        let mut workers = self.workers.lock().unwrap();
        let Some(status) = workers.get_mut(name) else {
            warn!(worker = name, "start report for unknown worker ignored");
            return;
        };
        if status.state == WorkerState::Starting {
            return;
        }
        debug!(worker = name, from = ?status.state, "worker starting");
        status.state = WorkerState::Starting;
        status.last_activity_ms = now.as_millis() as u64;
    }

    /// Records successful initialization, or refreshes the activity stamp
    /// of an already-active worker.
    ///
    /// A worker that never reported `Starting` cannot become `Active`; the
    /// report is ignored with a warning.
    pub fn report_active(&self, name: &str, now: Duration) {
        let mut workers = self.workers.lock().unwrap();
        let Some(status) = workers.get_mut(name) else {
            warn!(worker = name, "active report for unknown worker ignored");
            return;
        };
        match status.state {
            WorkerState::Starting => {
                debug!(worker = name, "worker active");
                status.state = WorkerState::Active;
                status.last_activity_ms = now.as_millis() as u64;
            }
            WorkerState::Active => {
                status.last_activity_ms = now.as_millis() as u64;
            }
            other => {
                warn!(
                    worker = name,
                    state = ?other,
                    "active report without a starting transition ignored"
                );
            }
        }
    }

    /// Records a failure against a worker and moves it to `Errored`.
    pub fn report_error(&self, name: &str, err: &dyn std::fmt::Display, now: Duration) {
        let mut workers = self.workers.lock().unwrap();
        let Some(status) = workers.get_mut(name) else {
            warn!(worker = name, "error report for unknown worker ignored");
            return;
        };
        status.state = WorkerState::Errored;
        status.error_count += 1;
        status.last_activity_ms = now.as_millis() as u64;
        warn!(worker = name, error = %err, errors = status.error_count, "worker error");
    }

    /// Aggregate health: `100 * active/total - 5 * total errors`, clamped
    /// to [0, 100].
    pub fn health_score(&self) -> u8 {
        let workers = self.workers.lock().unwrap();
        let total = workers.len() as i64;
        if total == 0 {
            return 0;
        }
        let active = workers
            .values()
            .filter(|w| w.state == WorkerState::Active)
            .count() as i64;
        let errors: i64 = workers.values().map(|w| w.error_count as i64).sum();
        (100 * active / total - 5 * errors).clamp(0, 100) as u8
    }

    /// Sum of all worker error counters.
    pub fn total_errors(&self) -> u64 {
        let workers = self.workers.lock().unwrap();
        workers.values().map(|w| w.error_count as u64).sum()
    }

    /// Error count for one worker (0 for unknown names).
    pub fn error_count(&self, name: &str) -> u32 {
        let workers = self.workers.lock().unwrap();
        workers.get(name).map(|w| w.error_count).unwrap_or(0)
    }

    /// Current state for one worker.
    pub fn worker_state(&self, name: &str) -> Option<WorkerState> {
        let workers = self.workers.lock().unwrap();
        workers.get(name).map(|w| w.state)
    }

    /// Read-only snapshot of all workers.
    pub fn snapshot(&self) -> Vec<WorkerStatus> {
        let workers = self.workers.lock().unwrap();
        workers.values().cloned().collect()
    }
}
