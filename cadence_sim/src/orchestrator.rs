//! Cycle orchestrator - drives repeated 7-day simulation cycles.
//!
//! State machine: **idle -> running -> stopping -> idle**. The drive loop
//! ticks once per simulated hour boundary, forwards generated descriptors
//! to the dispatch queue, and ends a cycle when the simulated week is over
//! or the wall-clock budget for the cycle expires. Between cycles it pauses
//! the clock, sleeps the configured inter-cycle pause, resets cycle state,
//! and starts again - indefinitely, until stopped.
//!
//! A failure inside one tick is caught, counted against the orchestrator
//! worker, and the loop continues with the next tick.

use cadence_core::clock::VirtualClock;
use cadence_core::dispatch::DispatchQueue;
use cadence_core::lifecycle::{LifecycleMonitor, WorkerState, WORKER_ORCHESTRATOR};
use cadence_core::scenario::ScenarioGenerator;
use cadence_env::EngineContext;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const HOUR: Duration = Duration::from_secs(3600);

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Simulated hour at which each cycle opens (business day start)
    pub start_hour: u8,
    /// Speed level applied when continuous simulation starts
    pub default_level: u8,
    /// Wall-clock budget per cycle; the cycle ends when it expires even if
    /// the simulated week has not finished
    pub cycle_wall_budget: Duration,
    /// Pause between the end of one cycle and the start of the next
    pub inter_cycle_pause: Duration,
    /// Re-check interval while the clock is paused by the operator
    pub paused_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            start_hour: 8,
            default_level: 4,
            cycle_wall_budget: Duration::from_secs(30 * 60),
            inter_cycle_pause: Duration::from_secs(5),
            paused_poll: Duration::from_millis(250),
        }
    }
}

/// Position of the current cycle, owned exclusively by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleState {
    /// 1-based cycle counter, increments at every reset
    pub cycle_number: u64,
    /// Simulated day of week (1..=7)
    pub sim_day: u8,
    /// Simulated hour of day (0..=23)
    pub sim_hour: u8,
}

/// Runs repeated, resettable simulation cycles driven by the virtual clock.
pub struct CycleOrchestrator<Ctx: EngineContext> {
    ctx: Arc<Ctx>,
    clock: Arc<VirtualClock<Ctx>>,
    queue: DispatchQueue,
    monitor: Arc<LifecycleMonitor>,
    generator: Mutex<ScenarioGenerator>,
    config: OrchestratorConfig,
    state: AtomicU8,
    stop_notify: Notify,
    cycle: Mutex<CycleState>,
}

impl<Ctx: EngineContext> CycleOrchestrator<Ctx> {
    /// Creates an idle orchestrator.
    pub fn new(
        ctx: Arc<Ctx>,
        clock: Arc<VirtualClock<Ctx>>,
        queue: DispatchQueue,
        monitor: Arc<LifecycleMonitor>,
        generator: ScenarioGenerator,
        config: OrchestratorConfig,
    ) -> Self {
        let start_hour = config.start_hour;
        Self {
            ctx,
            clock,
            queue,
            monitor,
            generator: Mutex::new(generator),
            config,
            state: AtomicU8::new(STATE_IDLE),
            stop_notify: Notify::new(),
            cycle: Mutex::new(CycleState {
                cycle_number: 1,
                sim_day: 1,
                sim_hour: start_hour,
            }),
        }
    }

    /// Starts the continuous drive loop in a background task.
    /// No-op if already running.
    pub fn start_continuous(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start_continuous ignored, orchestrator not idle");
            return;
        }
        self.monitor
            .report_starting(WORKER_ORCHESTRATOR, self.ctx.now());
        let this = Arc::clone(self);
        self.ctx.spawn("orchestrator", async move {
            this.drive_loop().await;
        });
    }

    /// Requests a cooperative stop: the tick in flight completes, then the
    /// loop exits without starting a new cycle.
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
        {
            info!("orchestrator stop requested");
            // notify_one stores a permit, so a signal sent between the
            // loop's flag check and its next wait is not lost
            self.stop_notify.notify_one();
        }
    }

    /// Whether the drive loop is active (running or winding down).
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STATE_IDLE
    }

    /// Snapshot of the current cycle position.
    pub fn cycle_state(&self) -> CycleState {
        self.cycle.lock().unwrap().clone()
    }

    /// Number of currently active issues.
    pub fn active_issue_count(&self) -> usize {
        self.generator.lock().unwrap().active_issue_count()
    }

    /// Returns cycle state and issues to their initial values. Intended for
    /// `resetSimulation` after the drive loop has been stopped.
    pub fn reset_state(&self) {
        let mut cycle = self.cycle.lock().unwrap();
        cycle.cycle_number = 1;
        cycle.sim_day = 1;
        cycle.sim_hour = self.config.start_hour;
        self.generator.lock().unwrap().reset();
    }

    fn stopping(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_STOPPING
    }

    /// Calendar position for a simulated elapsed time since cycle start.
    /// The day is unclamped so callers can detect week overflow.
    fn calendar_at(&self, sim_elapsed: Duration) -> (u64, u8) {
        let total_hours = self.config.start_hour as u64 + sim_elapsed.as_secs() / 3600;
        (1 + total_hours / 24, (total_hours % 24) as u8)
    }

    /// Re-anchors the clock for a fresh cycle, preserving the speed level
    /// across cycle boundaries (the configured default applies to the
    /// first cycle only).
    fn begin_cycle(&self, first: bool) {
        let level = if first {
            self.config.default_level
        } else {
            self.clock.level()
        };
        self.clock.reset();
        if let Err(err) = self.clock.set_level(level) {
            warn!(error = %err, "invalid cycle start level, staying at level 1");
        }
        self.clock.start();
    }

    async fn drive_loop(self: Arc<Self>) {
        info!("cycle orchestrator started");
        self.monitor
            .report_active(WORKER_ORCHESTRATOR, self.ctx.now());

        let mut first_cycle = true;
        'cycles: loop {
            if self.stopping() {
                break;
            }
            self.begin_cycle(first_cycle);
            first_cycle = false;
            let cycle_number = self.cycle.lock().unwrap().cycle_number;
            let cycle_started = self.ctx.now();
            info!(
                cycle = cycle_number,
                level = self.clock.level(),
                "cycle started"
            );

            let mut next_tick: u64 = 0;
            loop {
                if self.stopping() {
                    break 'cycles;
                }
                if self.ctx.now().saturating_sub(cycle_started) >= self.config.cycle_wall_budget {
                    info!(cycle = cycle_number, "cycle wall budget reached");
                    break;
                }

                let target = HOUR.saturating_mul(next_tick as u32);
                let sim_now = self.clock.now();
                if sim_now < target {
                    let wait = if self.clock.is_running() {
                        let mult =
                            u32::try_from(self.clock.current_multiplier()).unwrap_or(u32::MAX);
                        ((target - sim_now) / mult).max(Duration::from_millis(1))
                    } else {
                        self.config.paused_poll
                    };
                    tokio::select! {
                        _ = self.ctx.sleep(wait) => {}
                        _ = self.stop_notify.notified() => {}
                    }
                    continue;
                }

                let (day, hour) = self.calendar_at(target);
                if day > 7 {
                    info!(cycle = cycle_number, "simulated week complete");
                    break;
                }
                self.run_tick(day as u8, hour);
                next_tick += 1;
            }

            self.clock.pause();
            info!(cycle = cycle_number, "cycle ended, pausing before reset");
            tokio::select! {
                _ = self.ctx.sleep(self.config.inter_cycle_pause) => {}
                _ = self.stop_notify.notified() => {}
            }
            if self.stopping() {
                break;
            }

            {
                let mut cycle = self.cycle.lock().unwrap();
                cycle.cycle_number += 1;
                cycle.sim_day = 1;
                cycle.sim_hour = self.config.start_hour;
            }
            self.generator.lock().unwrap().reset();
        }

        self.clock.pause();
        self.state.store(STATE_IDLE, Ordering::SeqCst);
        info!("cycle orchestrator stopped");
    }

    /// One tick: generate descriptors for the calendar position and enqueue
    /// them. Failures are recorded, never propagated - a single bad tick
    /// must not abort the continuous run.
    fn run_tick(&self, day: u8, hour: u8) {
        let outcome = self.generator.lock().unwrap().tick(day, hour);
        match outcome {
            Ok(events) => {
                let produced = events.len();
                for event in events {
                    self.queue.enqueue(event);
                }
                {
                    let mut cycle = self.cycle.lock().unwrap();
                    cycle.sim_day = day;
                    cycle.sim_hour = hour;
                }
                if self.monitor.worker_state(WORKER_ORCHESTRATOR) == Some(WorkerState::Errored) {
                    self.monitor
                        .report_starting(WORKER_ORCHESTRATOR, self.ctx.now());
                }
                self.monitor
                    .report_active(WORKER_ORCHESTRATOR, self.ctx.now());
                debug!(day, hour, produced, "tick complete");
            }
            Err(err) => {
                self.monitor
                    .report_error(WORKER_ORCHESTRATOR, &err, self.ctx.now());
                warn!(error = %err, day, hour, "tick failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::clock::SpeedTable;
    use cadence_core::dispatch::DispatchConfig;
    use cadence_core::lifecycle::DEFAULT_WORKERS;
    use cadence_core::scenario::ScenarioConfig;
    use cadence_env::ManualContext;

    fn fast_orchestrator(
        ctx: &Arc<ManualContext>,
    ) -> (Arc<CycleOrchestrator<ManualContext>>, DispatchQueue) {
        // Level 2 compresses the whole week into ten virtual minutes
        let table = SpeedTable::new(vec![1, 1008]).unwrap();
        let clock = Arc::new(VirtualClock::with_table(Arc::clone(ctx), table));
        let queue = DispatchQueue::new(DispatchConfig {
            per_minute: 100_000,
            per_hour: 1_000_000,
            queue_capacity: 100_000,
            ..DispatchConfig::default()
        })
        .unwrap();
        let monitor = Arc::new(LifecycleMonitor::new(&DEFAULT_WORKERS));
        let generator = ScenarioGenerator::new(ScenarioConfig::seeded(42));
        let config = OrchestratorConfig {
            default_level: 2,
            cycle_wall_budget: Duration::from_secs(3600),
            inter_cycle_pause: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        };
        let orch = Arc::new(CycleOrchestrator::new(
            Arc::clone(ctx),
            clock,
            queue.clone(),
            monitor,
            generator,
            config,
        ));
        (orch, queue)
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..2_000_000 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_week_completes_and_resets_exactly_once() {
        let ctx = ManualContext::shared(1);
        let (orch, queue) = fast_orchestrator(&ctx);
        orch.start_continuous();

        wait_for(|| orch.cycle_state().cycle_number == 2).await;
        let state = orch.cycle_state();
        assert_eq!(state.sim_day, 1);
        assert_eq!(state.sim_hour, 8);
        assert_eq!(orch.active_issue_count(), 0);

        // The full week of cycle 1 produced events
        assert!(!queue.is_empty());

        // A x1008 run covers the 7-day week in ten virtual minutes plus the
        // inter-cycle pause; well under twelve minutes total
        assert!(ctx.now() < Duration::from_secs(720));

        orch.stop();
        wait_for(|| !orch.is_running()).await;
    }

    #[tokio::test]
    async fn test_cycle_boundaries_identical_across_resets() {
        let ctx = ManualContext::shared(2);
        let (orch, _queue) = fast_orchestrator(&ctx);
        orch.start_continuous();

        wait_for(|| orch.cycle_state().cycle_number == 2).await;
        let at_cycle_2 = orch.cycle_state();
        wait_for(|| orch.cycle_state().cycle_number == 3).await;
        let at_cycle_3 = orch.cycle_state();

        // Identical modulo the cycle counter
        assert_eq!(at_cycle_2.sim_day, at_cycle_3.sim_day);
        assert_eq!(at_cycle_2.sim_hour, at_cycle_3.sim_hour);

        orch.stop();
        wait_for(|| !orch.is_running()).await;
    }

    #[tokio::test]
    async fn test_stop_exits_without_new_cycle() {
        let ctx = ManualContext::shared(3);
        let (orch, _queue) = fast_orchestrator(&ctx);
        orch.start_continuous();
        wait_for(|| orch.cycle_state().sim_hour > 8).await;

        orch.stop();
        wait_for(|| !orch.is_running()).await;
        let frozen = orch.cycle_state();
        assert_eq!(frozen.cycle_number, 1);

        // Idle loop leaves state untouched
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(orch.cycle_state(), frozen);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let ctx = ManualContext::shared(4);
        let (orch, _queue) = fast_orchestrator(&ctx);
        orch.start_continuous();
        orch.start_continuous(); // second call must not spawn a second loop

        wait_for(|| orch.cycle_state().cycle_number == 2).await;
        // A doubled loop would advance the cycle counter twice as fast and
        // double-generate; the reset state check catches gross corruption
        let state = orch.cycle_state();
        assert_eq!(state.sim_day, 1);

        orch.stop();
        wait_for(|| !orch.is_running()).await;
    }

    #[tokio::test]
    async fn test_reset_state_returns_to_cycle_one() {
        let ctx = ManualContext::shared(5);
        let (orch, _queue) = fast_orchestrator(&ctx);
        orch.start_continuous();
        wait_for(|| orch.cycle_state().cycle_number == 2).await;

        orch.stop();
        wait_for(|| !orch.is_running()).await;
        orch.reset_state();

        let state = orch.cycle_state();
        assert_eq!(state.cycle_number, 1);
        assert_eq!(state.sim_day, 1);
        assert_eq!(state.sim_hour, 8);
        assert_eq!(orch.active_issue_count(), 0);
    }
}
