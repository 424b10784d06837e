//! Production implementation of EngineContext using Tokio.

use crate::EngineContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Production context backed by Tokio and the system clock.
///
/// This is the "real" implementation used in production deployments.
/// Time is measured against a monotonic anchor taken at construction.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
    /// Master seed, 0 unless explicitly seeded
    seed: u64,
}

impl TokioContext {
    /// Creates a new unseeded TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            seed: 0,
        }
    }

    /// Creates a TokioContext carrying a master seed for reproducible
    /// scenario generation.
    pub fn seeded(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed,
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::seeded(seed))
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string(); // Would be used for task instrumentation
        tokio::spawn(async move {
            future.await;
        });
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
