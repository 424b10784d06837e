//! Cadence core engines.
//!
//! Four leaf components, each independently testable:
//! - [`clock`] - virtual clock mapping real time to accelerated simulated
//!   time under a validated speed-level table
//! - [`scenario`] - deterministic generation of business-event volumes and
//!   injected issues from the simulated calendar position
//! - [`dispatch`] - bounded priority queue draining to an external sender
//!   under dual sliding-window rate limits
//! - [`lifecycle`] - start/active/error tracking for the fixed worker set
//!   with an aggregate health score
//!
//! All timing flows through [`cadence_env::EngineContext`], so every engine
//! runs identically under the production Tokio context and the manually
//! advanced test context.

pub mod clock;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod scenario;

pub use clock::{ClockSnapshot, SpeedTable, VirtualClock, DEFAULT_SPEED_MULTIPLIERS};
pub use dispatch::{DispatchConfig, DispatchQueue, DispatchStatsSnapshot};
pub use error::{ConfigError, TickError};
pub use lifecycle::{
    LifecycleMonitor, WorkerState, WorkerStatus, DEFAULT_WORKERS, WORKER_CLOCK, WORKER_DISPATCH,
    WORKER_ORCHESTRATOR,
};
pub use scenario::{
    hour_multiplier, is_peak_hour, DayTheme, Issue, IssueSeverity, IssueStatus, ScenarioConfig,
    ScenarioGenerator,
};
