//! Core environment context trait for Cadence engines.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for environment interaction.
///
/// This trait abstracts time and task scheduling so that the Cadence
/// engines can run in both production and test environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Test**: `ManualContext` - a manually advanced virtual clock
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism (time,
/// randomness) are controlled by the implementation. Engines derive their
/// RNG state from `seed()` and never read the OS clock directly.
#[async_trait]
pub trait EngineContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for internal timers, rate windows, and duration measurements.
    /// In tests this is the manually advanced virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In tests: advances the virtual clock and yields
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// The `name` is used for logging only; the task is detached and runs
    /// until completion or runtime shutdown.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's master seed (for logging/debugging and for
    /// deriving per-subsystem RNG seeds).
    ///
    /// In production, returns 0 unless explicitly seeded.
    fn seed(&self) -> u64;
}
