//! Simulation engine facade - the external control surface.
//!
//! Owns the virtual clock, dispatch queue, lifecycle monitor, and cycle
//! orchestrator, wires them to an environment context and an event sink,
//! and exposes the boundary operations polled by dashboards and tests.
//! Control errors (an invalid speed level) are returned synchronously;
//! background-loop errors surface only through `status()` and the health
//! score.

use crate::orchestrator::{CycleOrchestrator, OrchestratorConfig};
use cadence_core::clock::{SpeedTable, VirtualClock};
use cadence_core::dispatch::{DispatchConfig, DispatchQueue, DispatchStatsSnapshot};
use cadence_core::error::ConfigError;
use cadence_core::lifecycle::{LifecycleMonitor, DEFAULT_WORKERS, WORKER_CLOCK};
use cadence_core::scenario::{ScenarioConfig, ScenarioGenerator};
use cadence_env::{EngineContext, EventSink};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Odd constant for deriving the scenario seed from the master seed.
const SCENARIO_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Speed-level table for the virtual clock
    pub speed_table: SpeedTable,
    /// Dispatch queue and rate-limit settings
    pub dispatch: DispatchConfig,
    /// Drive loop settings
    pub orchestrator: OrchestratorConfig,
    /// Scenario thresholds; a zero seed is replaced by one derived from
    /// the context's master seed
    pub scenario: ScenarioConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_table: SpeedTable::default(),
            dispatch: DispatchConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            scenario: ScenarioConfig::default(),
        }
    }
}

/// Machine-readable status snapshot, the minimum external contract for
/// dashboards and tests.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Current cycle counter
    pub cycle_number: u64,
    /// Simulated day of week (1..=7)
    pub sim_day: u8,
    /// Simulated hour of day (0..=23)
    pub sim_hour: u8,
    /// Current speed level
    pub speed_level: u8,
    /// Whether the virtual clock is advancing
    pub running: bool,
    /// Currently active issues
    pub active_issue_count: usize,
    /// Descriptors waiting in the dispatch queue
    pub queue_depth: usize,
    /// Successful admissions inside the minute window
    pub recent_rate_minute: usize,
    /// Successful admissions inside the hour window
    pub recent_rate_hour: usize,
    /// Aggregate worker health, 0..=100
    pub health_score: u8,
    /// Cumulative delivery counters
    pub delivery: DispatchStatsSnapshot,
}

/// The assembled simulation engine.
pub struct SimulationEngine<Ctx: EngineContext, S: EventSink> {
    ctx: Arc<Ctx>,
    clock: Arc<VirtualClock<Ctx>>,
    queue: DispatchQueue,
    monitor: Arc<LifecycleMonitor>,
    orchestrator: Arc<CycleOrchestrator<Ctx>>,
    sink: Arc<S>,
    consumer_started: AtomicBool,
}

impl<Ctx: EngineContext, S: EventSink> SimulationEngine<Ctx, S> {
    /// Assembles the engine. Invalid dispatch configuration is rejected
    /// here, before any task starts.
    pub fn new(ctx: Arc<Ctx>, sink: Arc<S>, config: EngineConfig) -> Result<Self, ConfigError> {
        let queue = DispatchQueue::new(config.dispatch)?;
        let clock = Arc::new(VirtualClock::with_table(
            Arc::clone(&ctx),
            config.speed_table,
        ));
        let monitor = Arc::new(LifecycleMonitor::new(&DEFAULT_WORKERS));

        let mut scenario = config.scenario;
        if scenario.seed == 0 {
            scenario.seed = ctx.seed().wrapping_mul(SCENARIO_SEED_SALT);
        }
        let generator = ScenarioGenerator::new(scenario);

        let orchestrator = Arc::new(CycleOrchestrator::new(
            Arc::clone(&ctx),
            Arc::clone(&clock),
            queue.clone(),
            Arc::clone(&monitor),
            generator,
            config.orchestrator,
        ));

        Ok(Self {
            ctx,
            clock,
            queue,
            monitor,
            orchestrator,
            sink,
            consumer_started: AtomicBool::new(false),
        })
    }

    /// Starts continuous simulation: the dispatch consumer (once) and the
    /// cycle orchestrator. No-op while already running.
    pub fn start_continuous(&self) {
        if !self.consumer_started.swap(true, Ordering::SeqCst) {
            let queue = self.queue.clone();
            let ctx = Arc::clone(&self.ctx);
            let sink = Arc::clone(&self.sink);
            let monitor = Arc::clone(&self.monitor);
            self.ctx.spawn("dispatch-consumer", async move {
                queue.run_consumer(ctx, sink, monitor).await;
            });
        }

        // The clock is a passive computation; its worker becomes active as
        // soon as the orchestrator anchors it
        self.monitor.report_starting(WORKER_CLOCK, self.ctx.now());
        self.orchestrator.start_continuous();
        self.monitor.report_active(WORKER_CLOCK, self.ctx.now());
        info!("continuous simulation started");
    }

    /// Changes the clock speed level. Returns false (and changes nothing)
    /// for a level outside the table.
    pub fn set_speed_level(&self, level: u8) -> bool {
        match self.clock.set_level(level) {
            Ok(()) => {
                info!(level, "speed level changed");
                true
            }
            Err(err) => {
                warn!(error = %err, "speed level rejected");
                false
            }
        }
    }

    /// Freezes the virtual clock; the drive loop idles until resumed.
    pub fn pause_clock(&self) {
        self.clock.pause();
        info!("clock paused");
    }

    /// Resumes a paused clock.
    pub fn resume_clock(&self) {
        self.clock.start();
        info!("clock resumed");
    }

    /// Stops the continuous run cooperatively: the tick in flight
    /// completes, then the orchestrator goes idle. The dispatch consumer
    /// keeps draining already-queued events; use [`shutdown`] for a full
    /// teardown.
    ///
    /// [`shutdown`]: SimulationEngine::shutdown
    pub fn stop_continuous(&self) {
        self.orchestrator.stop();
        info!("continuous simulation stopping");
    }

    /// Stops everything, including the dispatch consumer.
    pub fn shutdown(&self) {
        self.orchestrator.stop();
        self.queue.stop();
        info!("engine shutdown requested");
    }

    /// Returns the simulation to its initial state: orchestrator stopped,
    /// cycle counter back to 1, issues cleared, clock stopped at level 1.
    pub fn reset(&self) {
        self.orchestrator.stop();
        self.orchestrator.reset_state();
        self.clock.reset();
        info!("simulation reset");
    }

    /// Point-in-time status for dashboards and tests. Never blocks beyond
    /// brief internal mutexes.
    pub fn status(&self) -> StatusSnapshot {
        let cycle = self.orchestrator.cycle_state();
        let clock = self.clock.snapshot();
        let (recent_rate_minute, recent_rate_hour) = self.queue.recent_rates(self.ctx.now());
        StatusSnapshot {
            cycle_number: cycle.cycle_number,
            sim_day: cycle.sim_day,
            sim_hour: cycle.sim_hour,
            speed_level: clock.speed_level,
            running: clock.running,
            active_issue_count: self.orchestrator.active_issue_count(),
            queue_depth: self.queue.len(),
            recent_rate_minute,
            recent_rate_hour,
            health_score: self.monitor.health_score(),
            delivery: self.queue.stats(),
        }
    }

    /// The lifecycle monitor, for detailed worker inspection.
    pub fn monitor(&self) -> &Arc<LifecycleMonitor> {
        &self.monitor
    }
}
