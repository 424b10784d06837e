//! Virtual clock mapping elapsed real time to accelerated simulated time.
//!
//! The clock is a pure computation over a small piece of shared state: no
//! background ticking, no blocking. `now()` is valid at any time, including
//! while paused (it returns the frozen value), and is monotonically
//! non-decreasing across `set_level`, `pause`, and `start` calls.

use crate::error::ConfigError;
use cadence_env::EngineContext;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default multiplier table, levels 1..=6.
///
/// Level 1 is real time. Level 4 compresses a simulated day into two real
/// minutes; level 5 (x1008) compresses the full 7-day cycle into ten real
/// minutes; level 6 halves that again.
pub const DEFAULT_SPEED_MULTIPLIERS: &[u64] = &[1, 60, 360, 720, 1008, 2016];

/// Validated speed-level table.
///
/// Invariants: non-empty, level 1 maps to multiplier 1, multipliers strictly
/// increasing with level.
#[derive(Debug, Clone)]
pub struct SpeedTable {
    multipliers: Vec<u64>,
}

impl SpeedTable {
    /// Builds a table from raw multipliers, validating the invariants.
    pub fn new(multipliers: Vec<u64>) -> Result<Self, ConfigError> {
        if multipliers.is_empty() {
            return Err(ConfigError::speed_table("table must not be empty"));
        }
        if multipliers[0] != 1 {
            return Err(ConfigError::speed_table("level 1 must map to multiplier 1"));
        }
        for pair in multipliers.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::speed_table(
                    "multipliers must be strictly increasing",
                ));
            }
        }
        Ok(Self { multipliers })
    }

    /// Returns the multiplier for a 1-based level, or `None` if invalid.
    pub fn multiplier(&self, level: u8) -> Option<u64> {
        if level == 0 {
            return None;
        }
        self.multipliers.get(level as usize - 1).copied()
    }

    /// Highest valid level.
    pub fn max_level(&self) -> u8 {
        self.multipliers.len() as u8
    }
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            multipliers: DEFAULT_SPEED_MULTIPLIERS.to_vec(),
        }
    }
}

/// Internal clock state.
///
/// While running: `sim = sim_epoch + (ctx.now() - real_anchor) * multiplier`.
/// Pausing folds the accumulated simulated time into `sim_epoch`; every
/// resume and level change re-anchors `real_anchor` so the current simulated
/// instant is preserved.
#[derive(Debug)]
struct ClockState {
    sim_epoch: Duration,
    real_anchor: Duration,
    level: u8,
    running: bool,
}

/// Read-only clock snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ClockSnapshot {
    /// Simulated time elapsed since the last reset, in milliseconds
    pub sim_elapsed_ms: u64,
    /// Current speed level
    pub speed_level: u8,
    /// Multiplier for the current level
    pub multiplier: u64,
    /// Whether the clock is advancing
    pub running: bool,
}

/// Accelerated simulated clock.
pub struct VirtualClock<Ctx: EngineContext> {
    ctx: Arc<Ctx>,
    table: SpeedTable,
    state: Mutex<ClockState>,
}

impl<Ctx: EngineContext> VirtualClock<Ctx> {
    /// Creates a stopped clock at level 1 with the default table.
    pub fn new(ctx: Arc<Ctx>) -> Self {
        Self::with_table(ctx, SpeedTable::default())
    }

    /// Creates a stopped clock at level 1 with a custom table.
    pub fn with_table(ctx: Arc<Ctx>, table: SpeedTable) -> Self {
        let real_anchor = ctx.now();
        Self {
            ctx,
            table,
            state: Mutex::new(ClockState {
                sim_epoch: Duration::ZERO,
                real_anchor,
                level: 1,
                running: false,
            }),
        }
    }

    fn sim_now_locked(&self, state: &ClockState) -> Duration {
        if !state.running {
            return state.sim_epoch;
        }
        let elapsed = self.ctx.now().saturating_sub(state.real_anchor);
        let mult = self.table.multiplier(state.level).unwrap_or(1);
        let scaled_ns = (elapsed.as_nanos())
            .saturating_mul(mult as u128)
            .min(u64::MAX as u128) as u64;
        state.sim_epoch.saturating_add(Duration::from_nanos(scaled_ns))
    }

    /// Current simulated time elapsed since the last reset.
    ///
    /// Pure computation, never blocks beyond the state mutex.
    pub fn now(&self) -> Duration {
        let state = self.state.lock().unwrap();
        self.sim_now_locked(&state)
    }

    /// Starts the clock. No-op if already running.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        if state.running {
            return;
        }
        state.real_anchor = self.ctx.now();
        state.running = true;
    }

    /// Freezes simulated time at the call instant. No-op if already paused.
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return;
        }
        state.sim_epoch = self.sim_now_locked(&state);
        state.running = false;
    }

    /// Changes the speed level without any discontinuity in simulated time.
    ///
    /// The current simulated instant is folded into the epoch and the real
    /// anchor is reset, so `now()` immediately after equals `now()`
    /// immediately before. Rejects invalid levels with no state change.
    pub fn set_level(&self, level: u8) -> Result<(), ConfigError> {
        let mut state = self.state.lock().unwrap();
        if self.table.multiplier(level).is_none() {
            return Err(ConfigError::InvalidSpeedLevel {
                level,
                max: self.table.max_level(),
            });
        }
        state.sim_epoch = self.sim_now_locked(&state);
        state.real_anchor = self.ctx.now();
        state.level = level;
        Ok(())
    }

    /// Returns the clock to its initial state: stopped, level 1, simulated
    /// time zero.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.sim_epoch = Duration::ZERO;
        state.real_anchor = self.ctx.now();
        state.level = 1;
        state.running = false;
    }

    /// Current speed level.
    pub fn level(&self) -> u8 {
        self.state.lock().unwrap().level
    }

    /// Whether the clock is advancing.
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Multiplier currently in effect.
    pub fn current_multiplier(&self) -> u64 {
        let state = self.state.lock().unwrap();
        self.table.multiplier(state.level).unwrap_or(1)
    }

    /// Highest valid level for this clock's table.
    pub fn max_level(&self) -> u8 {
        self.table.max_level()
    }

    /// Read-only snapshot for status reporting.
    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.state.lock().unwrap();
        ClockSnapshot {
            sim_elapsed_ms: self.sim_now_locked(&state).as_millis() as u64,
            speed_level: state.level,
            multiplier: self.table.multiplier(state.level).unwrap_or(1),
            running: state.running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_env::ManualContext;

    fn clock_at(seed: u64) -> (Arc<ManualContext>, VirtualClock<ManualContext>) {
        let ctx = ManualContext::shared(seed);
        let clock = VirtualClock::new(Arc::clone(&ctx));
        (ctx, clock)
    }

    #[test]
    fn test_speed_table_validation() {
        assert!(SpeedTable::new(vec![]).is_err());
        assert!(SpeedTable::new(vec![2, 60]).is_err());
        assert!(SpeedTable::new(vec![1, 60, 60]).is_err());
        assert!(SpeedTable::new(vec![1, 60, 30]).is_err());

        let table = SpeedTable::new(vec![1, 604_800]).unwrap();
        assert_eq!(table.max_level(), 2);
        assert_eq!(table.multiplier(2), Some(604_800));
        assert_eq!(table.multiplier(0), None);
        assert_eq!(table.multiplier(3), None);
    }

    #[test]
    fn test_default_table_invariants() {
        let table = SpeedTable::default();
        assert_eq!(table.multiplier(1), Some(1));
        for level in 2..=table.max_level() {
            assert!(table.multiplier(level).unwrap() > table.multiplier(level - 1).unwrap());
        }
    }

    #[test]
    fn test_clock_fidelity_at_each_level() {
        let (ctx, clock) = clock_at(1);
        clock.start();
        for level in 1..=clock.max_level() {
            clock.set_level(level).unwrap();
            let before = clock.now();
            ctx.advance(Duration::from_secs(5));
            let elapsed = clock.now() - before;
            let expected = Duration::from_secs(5 * clock.current_multiplier());
            assert_eq!(elapsed, expected, "level {level}");
        }
    }

    #[test]
    fn test_set_level_no_time_jump() {
        let (ctx, clock) = clock_at(2);
        clock.start();
        ctx.advance(Duration::from_secs(10));

        let before = clock.now();
        clock.set_level(3).unwrap();
        let after = clock.now();
        assert_eq!(before, after);

        // And the new multiplier applies from here on
        ctx.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), before + Duration::from_secs(360));
    }

    #[test]
    fn test_invalid_level_rejected_without_state_change() {
        let (ctx, clock) = clock_at(3);
        clock.start();
        ctx.advance(Duration::from_secs(1));

        let before = clock.now();
        let err = clock.set_level(99).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidSpeedLevel {
                level: 99,
                max: clock.max_level()
            }
        );
        assert_eq!(clock.level(), 1);
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn test_pause_freezes_and_resume_is_continuous() {
        let (ctx, clock) = clock_at(4);
        clock.start();
        clock.set_level(2).unwrap();
        ctx.advance(Duration::from_secs(10)); // 600s simulated

        clock.pause();
        let frozen = clock.now();
        assert_eq!(frozen, Duration::from_secs(600));

        // Paused clock ignores real time, now() stays readable
        ctx.advance(Duration::from_secs(100));
        assert_eq!(clock.now(), frozen);

        clock.start();
        ctx.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), frozen + Duration::from_secs(60));
    }

    #[test]
    fn test_start_is_idempotent() {
        let (ctx, clock) = clock_at(5);
        clock.start();
        ctx.advance(Duration::from_secs(3));
        clock.start(); // must not re-anchor
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let (ctx, clock) = clock_at(6);
        clock.start();
        clock.set_level(4).unwrap();
        ctx.advance(Duration::from_secs(9));

        clock.reset();
        assert!(!clock.is_running());
        assert_eq!(clock.level(), 1);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_now_monotonic_across_operations() {
        let (ctx, clock) = clock_at(7);
        let mut last = clock.now();
        let mut check = |clock: &VirtualClock<ManualContext>| {
            let t = clock.now();
            assert!(t >= last);
            last = t;
        };

        clock.start();
        check(&clock);
        ctx.advance(Duration::from_secs(2));
        check(&clock);
        clock.set_level(3).unwrap();
        check(&clock);
        ctx.advance(Duration::from_millis(250));
        check(&clock);
        clock.pause();
        check(&clock);
        clock.start();
        check(&clock);
    }
}
