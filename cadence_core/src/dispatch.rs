//! Priority dispatch queue with dual sliding-window rate limiting.
//!
//! Producers enqueue without ever blocking; a single consumer drains in
//! priority order (critical > high > normal > low, FIFO within a tier) and
//! admits each item against two independent sliding windows before handing
//! it to the external sender.
//!
//! # Bounding policy
//!
//! The queue is bounded. On overflow the oldest item of the lowest-priority
//! non-empty tier is evicted to make room; if the incoming item ranks below
//! everything already queued, the incoming item is dropped instead. Either
//! way the eviction counter increments and the caller never blocks.
//!
//! # Window ownership
//!
//! The consumer is the sole writer of rate-window state. Producers (and
//! status polling) only read occupancy, so concurrent enqueues can never
//! cause rate-limit drift.

use crate::error::ConfigError;
use crate::lifecycle::{LifecycleMonitor, WORKER_DISPATCH};
use cadence_env::{EngineContext, EventDescriptor, EventSink, Priority};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Dispatch and rate-limit configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Ceiling on successful admissions per minute window
    pub per_minute: u32,
    /// Ceiling on successful admissions per hour window
    pub per_hour: u32,
    /// Length of the minute window (configurable for tests)
    pub minute_window: Duration,
    /// Length of the hour window (configurable for tests)
    pub hour_window: Duration,
    /// Total send attempts per item for transient failures
    pub retry_limit: u32,
    /// Backoff before the first retry; doubles per subsequent retry
    pub retry_backoff: Duration,
    /// Queue capacity across all tiers
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            per_minute: 30,
            per_hour: 600,
            minute_window: Duration::from_secs(60),
            hour_window: Duration::from_secs(3600),
            retry_limit: 3,
            retry_backoff: Duration::from_millis(100),
            queue_capacity: 1024,
        }
    }
}

impl DispatchConfig {
    /// Validates the configuration; rejected configs cause no state change.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.per_minute == 0 || self.per_hour == 0 {
            return Err(ConfigError::rate_limit("ceilings must be positive"));
        }
        if self.per_hour < self.per_minute {
            return Err(ConfigError::rate_limit(
                "hour ceiling must be at least the minute ceiling",
            ));
        }
        if self.minute_window.is_zero() || self.hour_window <= self.minute_window {
            return Err(ConfigError::rate_limit(
                "windows must be positive and the hour window longer than the minute window",
            ));
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::rate_limit("retry limit must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::rate_limit("queue capacity must be positive"));
        }
        Ok(())
    }
}

/// One sliding admission window over recent dispatch timestamps.
#[derive(Debug)]
struct SlidingWindow {
    len: Duration,
    ceiling: u32,
    stamps: VecDeque<Duration>,
}

impl SlidingWindow {
    fn new(len: Duration, ceiling: u32) -> Self {
        Self {
            len,
            ceiling,
            stamps: VecDeque::new(),
        }
    }

    /// Drops entries that have aged out of the window.
    fn purge(&mut self, now: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_sub(*oldest) >= self.len {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether an admission would keep the window at or under its ceiling.
    /// Only valid after `purge`.
    fn has_slot(&self) -> bool {
        self.stamps.len() < self.ceiling as usize
    }

    fn record(&mut self, now: Duration) {
        self.stamps.push_back(now);
    }

    /// Time until the oldest entry leaves the window: exactly
    /// `len - (now - oldest)`. Zero when the window is empty.
    fn wait_for_slot(&self, now: Duration) -> Duration {
        match self.stamps.front() {
            Some(oldest) => self.len.saturating_sub(now.saturating_sub(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Read-only count of entries still inside the window.
    fn occupancy_at(&self, now: Duration) -> usize {
        self.stamps
            .iter()
            .filter(|t| now.saturating_sub(**t) < self.len)
            .count()
    }
}

/// Delivery counters, updated by the consumer and read by status polling.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    /// Events handed to the sender and acknowledged
    pub delivered: u64,
    /// Transient failures that were retried
    pub retries: u64,
    /// Events dropped after retry exhaustion or terminal rejection
    pub dropped: u64,
    /// Events evicted (or refused) by the overflow policy
    pub evicted: u64,
}

fn tier_index(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
    }
}

struct Shared {
    config: DispatchConfig,
    tiers: Mutex<[VecDeque<EventDescriptor>; 4]>,
    /// (minute, hour); consumer is the sole writer
    windows: Mutex<(SlidingWindow, SlidingWindow)>,
    enqueue_notify: Notify,
    stop_flag: AtomicBool,
    stop_notify: Notify,
    stats: DispatchStats,
}

/// Cloneable handle to the dispatch queue.
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<Shared>,
}

impl DispatchQueue {
    /// Creates a queue with a validated configuration.
    pub fn new(config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let windows = (
            SlidingWindow::new(config.minute_window, config.per_minute),
            SlidingWindow::new(config.hour_window, config.per_hour),
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                tiers: Mutex::new(std::array::from_fn(|_| VecDeque::new())),
                windows: Mutex::new(windows),
                enqueue_notify: Notify::new(),
                stop_flag: AtomicBool::new(false),
                stop_notify: Notify::new(),
                stats: DispatchStats::default(),
            }),
        })
    }

    /// Enqueues a descriptor. Never blocks the caller; on overflow the
    /// bounding policy documented at module level applies.
    pub fn enqueue(&self, event: EventDescriptor) {
        {
            let mut tiers = self.shared.tiers.lock().unwrap();
            let total: usize = tiers.iter().map(VecDeque::len).sum();
            if total >= self.shared.config.queue_capacity {
                let incoming_idx = tier_index(event.priority);
                let evict_idx = (0..tiers.len()).rev().find(|i| !tiers[*i].is_empty());
                match evict_idx {
                    Some(idx) if idx >= incoming_idx => {
                        let victim = tiers[idx].pop_front();
                        self.shared.stats.evicted.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            evicted = ?victim.map(|v| v.priority),
                            incoming = %event.priority,
                            "queue full, evicted oldest item of lowest tier"
                        );
                    }
                    _ => {
                        // Everything queued outranks the incoming item
                        self.shared.stats.evicted.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            incoming = %event.priority,
                            "queue full of higher-priority items, incoming dropped"
                        );
                        return;
                    }
                }
            }
            tiers[tier_index(event.priority)].push_back(event);
        }
        self.shared.enqueue_notify.notify_one();
    }

    /// Number of queued descriptors across all tiers.
    pub fn len(&self) -> usize {
        self.shared.tiers.lock().unwrap().iter().map(VecDeque::len).sum()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only occupancy of the (minute, hour) windows at `now`.
    ///
    /// Producers may call this for admission estimation; it never mutates
    /// window state.
    pub fn recent_rates(&self, now: Duration) -> (usize, usize) {
        let windows = self.shared.windows.lock().unwrap();
        (windows.0.occupancy_at(now), windows.1.occupancy_at(now))
    }

    /// Copy of the delivery counters.
    pub fn stats(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            delivered: self.shared.stats.delivered.load(Ordering::Relaxed),
            retries: self.shared.stats.retries.load(Ordering::Relaxed),
            dropped: self.shared.stats.dropped.load(Ordering::Relaxed),
            evicted: self.shared.stats.evicted.load(Ordering::Relaxed),
        }
    }

    /// Signals the consumer to exit at its next suspension point.
    ///
    /// `notify_one` stores a permit when the consumer is not currently
    /// waiting, so the signal is never lost to a check-then-wait race.
    pub fn stop(&self) {
        self.shared.stop_flag.store(true, Ordering::SeqCst);
        self.shared.stop_notify.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.shared.stop_flag.load(Ordering::SeqCst)
    }

    fn pop_next(&self) -> Option<EventDescriptor> {
        let mut tiers = self.shared.tiers.lock().unwrap();
        tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    fn requeue_front(&self, event: EventDescriptor) {
        let mut tiers = self.shared.tiers.lock().unwrap();
        tiers[tier_index(event.priority)].push_front(event);
    }

    /// Runs the single consumer until `stop()`.
    ///
    /// For each item the admission decision and the window updates happen
    /// atomically under the window lock; the send attempt follows
    /// immediately (single consumer, so no interleaving between decision
    /// and attempt). When admission fails the item returns to the front of
    /// its tier and the consumer sleeps exactly until the nearer full
    /// window frees a slot, then re-checks.
    pub async fn run_consumer<Ctx, S>(
        &self,
        ctx: Arc<Ctx>,
        sink: Arc<S>,
        monitor: Arc<LifecycleMonitor>,
    ) where
        Ctx: EngineContext,
        S: EventSink,
    {
        monitor.report_starting(WORKER_DISPATCH, ctx.now());
        monitor.report_active(WORKER_DISPATCH, ctx.now());
        info!("dispatch consumer started");

        while !self.is_stopped() {
            let Some(event) = self.pop_next() else {
                tokio::select! {
                    _ = self.shared.enqueue_notify.notified() => {}
                    _ = self.shared.stop_notify.notified() => {}
                }
                continue;
            };

            let admission = {
                let mut windows = self.shared.windows.lock().unwrap();
                let now = ctx.now();
                windows.0.purge(now);
                windows.1.purge(now);
                if windows.0.has_slot() && windows.1.has_slot() {
                    windows.0.record(now);
                    windows.1.record(now);
                    Ok(())
                } else {
                    let mut wait = Duration::MAX;
                    if !windows.0.has_slot() {
                        wait = wait.min(windows.0.wait_for_slot(now));
                    }
                    if !windows.1.has_slot() {
                        wait = wait.min(windows.1.wait_for_slot(now));
                    }
                    Err(wait)
                }
            };

            match admission {
                Ok(()) => self.deliver_with_retry(&ctx, &sink, &monitor, event).await,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limited");
                    self.requeue_front(event);
                    tokio::select! {
                        _ = ctx.sleep(wait) => {}
                        _ = self.shared.stop_notify.notified() => {}
                    }
                }
            }
        }

        info!("dispatch consumer stopped");
    }

    async fn deliver_with_retry<Ctx, S>(
        &self,
        ctx: &Arc<Ctx>,
        sink: &Arc<S>,
        monitor: &Arc<LifecycleMonitor>,
        event: EventDescriptor,
    ) where
        Ctx: EngineContext,
        S: EventSink,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match sink.deliver(&event).await {
                Ok(receipt) => {
                    self.shared.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    // A worker that errored earlier re-enters through Starting
                    if monitor.worker_state(WORKER_DISPATCH)
                        == Some(crate::lifecycle::WorkerState::Errored)
                    {
                        monitor.report_starting(WORKER_DISPATCH, ctx.now());
                    }
                    monitor.report_active(WORKER_DISPATCH, ctx.now());
                    debug!(
                        receipt = %receipt.receipt_id,
                        priority = %event.priority,
                        category = %event.category,
                        "delivered"
                    );
                    return;
                }
                Err(err)
                    if err.is_retryable()
                        && attempt < self.shared.config.retry_limit
                        && !self.is_stopped() =>
                {
                    self.shared.stats.retries.fetch_add(1, Ordering::Relaxed);
                    let backoff = self
                        .shared
                        .config
                        .retry_backoff
                        .saturating_mul(1u32 << (attempt - 1));
                    warn!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err,
                        "transient delivery failure, backing off");
                    tokio::select! {
                        _ = ctx.sleep(backoff) => {}
                        _ = self.shared.stop_notify.notified() => {}
                    }
                }
                Err(err) => {
                    self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    monitor.report_error(WORKER_DISPATCH, &err, ctx.now());
                    warn!(
                        priority = %event.priority,
                        attempts = attempt,
                        error = %err,
                        "delivery failed, dropping event"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::DEFAULT_WORKERS;
    use async_trait::async_trait;
    use cadence_env::{DeliveryError, DeliveryReceipt, EventCategory, ManualContext};
    use proptest::prelude::*;

    fn ev(priority: Priority, target_count: u32) -> EventDescriptor {
        EventDescriptor::new(priority, EventCategory::Orders, target_count, 1, 9)
    }

    fn quick_config() -> DispatchConfig {
        DispatchConfig {
            per_minute: 1000,
            per_hour: 10_000,
            ..DispatchConfig::default()
        }
    }

    /// Records every delivery with its virtual timestamp.
    struct CollectingSink {
        ctx: Arc<ManualContext>,
        seen: Mutex<Vec<(EventDescriptor, Duration)>>,
    }

    impl CollectingSink {
        fn new(ctx: Arc<ManualContext>) -> Arc<Self> {
            Arc::new(Self {
                ctx,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn deliveries(&self) -> Vec<(EventDescriptor, Duration)> {
            self.seen.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn deliver(
            &self,
            event: &EventDescriptor,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            let now = self.ctx.now();
            self.seen.lock().unwrap().push((event.clone(), now));
            Ok(DeliveryReceipt::new(now.as_millis() as u64))
        }
    }

    /// Fails with the scripted errors, then succeeds.
    struct ScriptedSink {
        script: Mutex<Vec<DeliveryError>>,
        delivered: Mutex<Vec<EventDescriptor>>,
    }

    impl ScriptedSink {
        fn new(script: Vec<DeliveryError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EventSink for ScriptedSink {
        async fn deliver(
            &self,
            event: &EventDescriptor,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                self.delivered.lock().unwrap().push(event.clone());
                Ok(DeliveryReceipt::new(0))
            } else {
                Err(script.remove(0))
            }
        }
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..100_000 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    fn spawn_consumer<S: EventSink>(
        queue: &DispatchQueue,
        ctx: &Arc<ManualContext>,
        sink: &Arc<S>,
    ) -> Arc<LifecycleMonitor> {
        let monitor = Arc::new(LifecycleMonitor::new(&DEFAULT_WORKERS));
        let q = queue.clone();
        let ctx = Arc::clone(ctx);
        let sink = Arc::clone(sink);
        let m = Arc::clone(&monitor);
        tokio::spawn(async move {
            q.run_consumer(ctx, sink, m).await;
        });
        monitor
    }

    #[test]
    fn test_config_validation() {
        assert!(DispatchConfig::default().validate().is_ok());
        assert!(DispatchConfig {
            per_minute: 0,
            ..DispatchConfig::default()
        }
        .validate()
        .is_err());
        assert!(DispatchConfig {
            per_minute: 10,
            per_hour: 5,
            ..DispatchConfig::default()
        }
        .validate()
        .is_err());
        assert!(DispatchConfig {
            hour_window: Duration::from_secs(30),
            ..DispatchConfig::default()
        }
        .validate()
        .is_err());
        assert!(DispatchConfig {
            retry_limit: 0,
            ..DispatchConfig::default()
        }
        .validate()
        .is_err());
        assert!(DispatchConfig {
            queue_capacity: 0,
            ..DispatchConfig::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_pop_order_priority_then_fifo() {
        let queue = DispatchQueue::new(quick_config()).unwrap();
        queue.enqueue(ev(Priority::Low, 1));
        queue.enqueue(ev(Priority::High, 1));
        queue.enqueue(ev(Priority::Critical, 1));
        queue.enqueue(ev(Priority::High, 2));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|e| (e.priority, e.target_count))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::Critical, 1),
                (Priority::High, 1),
                (Priority::High, 2),
                (Priority::Low, 1),
            ]
        );
    }

    #[test]
    fn test_overflow_evicts_oldest_lowest_tier() {
        let config = DispatchConfig {
            queue_capacity: 3,
            ..quick_config()
        };
        let queue = DispatchQueue::new(config).unwrap();
        queue.enqueue(ev(Priority::Low, 1));
        queue.enqueue(ev(Priority::Low, 2));
        queue.enqueue(ev(Priority::Normal, 1));

        queue.enqueue(ev(Priority::High, 1)); // evicts Low #1
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.stats().evicted, 1);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop_next())
            .map(|e| (e.priority, e.target_count))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::High, 1),
                (Priority::Normal, 1),
                (Priority::Low, 2),
            ]
        );
    }

    #[test]
    fn test_overflow_drops_incoming_when_outranked() {
        let config = DispatchConfig {
            queue_capacity: 2,
            ..quick_config()
        };
        let queue = DispatchQueue::new(config).unwrap();
        queue.enqueue(ev(Priority::Critical, 1));
        queue.enqueue(ev(Priority::Critical, 2));

        queue.enqueue(ev(Priority::Low, 1)); // refused, everything outranks it
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().evicted, 1);
        assert_eq!(queue.pop_next().unwrap().target_count, 1);
    }

    #[tokio::test]
    async fn test_consumer_dispatches_in_priority_order() {
        let ctx = ManualContext::shared(1);
        let queue = DispatchQueue::new(quick_config()).unwrap();
        queue.enqueue(ev(Priority::Low, 1));
        queue.enqueue(ev(Priority::High, 1));
        queue.enqueue(ev(Priority::Critical, 1));
        queue.enqueue(ev(Priority::High, 2));

        let sink = CollectingSink::new(Arc::clone(&ctx));
        spawn_consumer(&queue, &ctx, &sink);

        wait_for(|| sink.count() == 4).await;
        queue.stop();

        let order: Vec<_> = sink
            .deliveries()
            .iter()
            .map(|(e, _)| (e.priority, e.target_count))
            .collect();
        assert_eq!(
            order,
            vec![
                (Priority::Critical, 1),
                (Priority::High, 1),
                (Priority::High, 2),
                (Priority::Low, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_sliding_ceilings_hold_for_burst_of_forty() {
        let ctx = ManualContext::shared(2);
        let config = DispatchConfig {
            per_minute: 5,
            per_hour: 30,
            ..DispatchConfig::default()
        };
        let queue = DispatchQueue::new(config).unwrap();
        for i in 0..40 {
            queue.enqueue(ev(Priority::Normal, i + 1));
        }

        let sink = CollectingSink::new(Arc::clone(&ctx));
        spawn_consumer(&queue, &ctx, &sink);

        wait_for(|| sink.count() == 40).await;
        queue.stop();

        let stamps: Vec<Duration> = sink.deliveries().iter().map(|(_, t)| *t).collect();

        // First minute and first hour respect the ceilings
        assert!(stamps.iter().filter(|t| **t < Duration::from_secs(60)).count() <= 5);
        assert!(stamps.iter().filter(|t| **t < Duration::from_secs(3600)).count() <= 30);

        // No sliding sub-window anywhere exceeds either ceiling
        for (i, start) in stamps.iter().enumerate() {
            let in_minute = stamps[i..]
                .iter()
                .filter(|t| **t < *start + Duration::from_secs(60))
                .count();
            assert!(in_minute <= 5, "minute window violated at {:?}", start);
            let in_hour = stamps[i..]
                .iter()
                .filter(|t| **t < *start + Duration::from_secs(3600))
                .count();
            assert!(in_hour <= 30, "hour window violated at {:?}", start);
        }
    }

    #[tokio::test]
    async fn test_rate_limited_item_keeps_fifo_position() {
        let ctx = ManualContext::shared(3);
        let config = DispatchConfig {
            per_minute: 1,
            per_hour: 100,
            ..DispatchConfig::default()
        };
        let queue = DispatchQueue::new(config).unwrap();
        queue.enqueue(ev(Priority::Normal, 1));
        queue.enqueue(ev(Priority::Normal, 2));

        let sink = CollectingSink::new(Arc::clone(&ctx));
        spawn_consumer(&queue, &ctx, &sink);

        wait_for(|| sink.count() == 2).await;
        queue.stop();

        let deliveries = sink.deliveries();
        assert_eq!(deliveries[0].0.target_count, 1);
        assert_eq!(deliveries[1].0.target_count, 2);
        // Second item admitted exactly when the first stamp left the window
        assert_eq!(deliveries[1].1 - deliveries[0].1, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_delivered() {
        let ctx = ManualContext::shared(4);
        let queue = DispatchQueue::new(quick_config()).unwrap();
        let sink = ScriptedSink::new(vec![
            DeliveryError::transient("connect reset"),
            DeliveryError::transient("connect reset"),
        ]);
        spawn_consumer(&queue, &ctx, &sink);

        queue.enqueue(ev(Priority::Normal, 7));
        wait_for(|| queue.stats().delivered == 1).await;
        queue.stop();

        let stats = queue.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.dropped, 0);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_retry_bound() {
        let ctx = ManualContext::shared(5);
        let queue = DispatchQueue::new(quick_config()).unwrap();
        let sink = ScriptedSink::new(vec![
            DeliveryError::transient("down"),
            DeliveryError::transient("down"),
            DeliveryError::transient("down"),
        ]);
        let monitor = spawn_consumer(&queue, &ctx, &sink);

        queue.enqueue(ev(Priority::High, 1));
        wait_for(|| queue.stats().dropped == 1).await;
        queue.stop();

        let stats = queue.stats();
        // 3 attempts: 2 backoffs, then the third failure drops the item
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.delivered, 0);
        assert_eq!(monitor.error_count(WORKER_DISPATCH), 1);
    }

    #[tokio::test]
    async fn test_terminal_failure_drops_without_retry() {
        let ctx = ManualContext::shared(6);
        let queue = DispatchQueue::new(quick_config()).unwrap();
        let sink = ScriptedSink::new(vec![DeliveryError::terminal("rejected")]);
        let monitor = spawn_consumer(&queue, &ctx, &sink);

        queue.enqueue(ev(Priority::Critical, 1));
        queue.enqueue(ev(Priority::Normal, 2));
        wait_for(|| queue.stats().delivered == 1).await;
        queue.stop();

        let stats = queue.stats();
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.dropped, 1);
        // The queue kept draining after the terminal failure
        assert_eq!(sink.delivered.lock().unwrap()[0].target_count, 2);
        assert_eq!(monitor.error_count(WORKER_DISPATCH), 1);
    }

    #[tokio::test]
    async fn test_recent_rates_reflect_window_occupancy() {
        let ctx = ManualContext::shared(8);
        let config = DispatchConfig {
            per_minute: 2,
            per_hour: 100,
            ..DispatchConfig::default()
        };
        let queue = DispatchQueue::new(config).unwrap();
        let sink = CollectingSink::new(Arc::clone(&ctx));
        spawn_consumer(&queue, &ctx, &sink);

        queue.enqueue(ev(Priority::Normal, 1));
        queue.enqueue(ev(Priority::Normal, 2));
        wait_for(|| sink.count() == 2).await;

        let (minute, hour) = queue.recent_rates(ctx.now());
        assert_eq!(minute, 2);
        assert_eq!(hour, 2);

        // After the minute window passes, minute occupancy drains
        ctx.advance(Duration::from_secs(61));
        let (minute, hour) = queue.recent_rates(ctx.now());
        assert_eq!(minute, 0);
        assert_eq!(hour, 2);
        queue.stop();
    }

    proptest! {
        /// A window fed admission attempts at arbitrary spacing never holds
        /// more than its ceiling.
        #[test]
        fn prop_window_never_exceeds_ceiling(
            deltas in prop::collection::vec(0u64..5_000, 1..200),
            ceiling in 1u32..20,
        ) {
            let mut window = SlidingWindow::new(Duration::from_secs(60), ceiling);
            let mut now = Duration::ZERO;
            for delta in deltas {
                now += Duration::from_millis(delta);
                window.purge(now);
                if window.has_slot() {
                    window.record(now);
                }
                prop_assert!(window.occupancy_at(now) <= ceiling as usize);
            }
        }

        /// After a full window passes with no admissions, the window is empty.
        #[test]
        fn prop_window_drains_completely(ceiling in 1u32..20) {
            let mut window = SlidingWindow::new(Duration::from_secs(60), ceiling);
            let mut now = Duration::ZERO;
            for _ in 0..ceiling {
                window.purge(now);
                prop_assert!(window.has_slot());
                window.record(now);
                now += Duration::from_millis(10);
            }
            now += Duration::from_secs(60);
            window.purge(now);
            prop_assert_eq!(window.occupancy_at(now), 0);
            prop_assert!(window.has_slot());
        }
    }
}
