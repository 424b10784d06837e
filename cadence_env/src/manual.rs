//! Manually advanced context for deterministic tests.

use crate::EngineContext;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test context backed by a manually advanced virtual clock.
///
/// `sleep` advances the clock by the requested amount and yields to the
/// scheduler, so loops written against [`EngineContext`] run to completion
/// in microseconds of wall time while observing exact virtual timing.
///
/// Cloning shares the underlying clock.
pub struct ManualContext {
    /// Master seed for this context
    seed: u64,

    /// Current virtual time (nanoseconds since context creation)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl ManualContext {
    /// Creates a new ManualContext with the given seed, at virtual time zero.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }
}

impl Clone for ManualContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
        }
    }
}

#[async_trait]
impl EngineContext for ManualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.virtual_time_ns.lock().unwrap())
    }

    async fn sleep(&self, duration: Duration) {
        // Advancing instead of waiting keeps tests deterministic; the yield
        // lets sibling tasks observe the new time before we continue.
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string();
        tokio::spawn(async move {
            future.await;
        });
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
