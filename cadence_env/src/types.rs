//! Shared payload types carried across the dispatch boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority tier of a generated event.
///
/// Ordering is derived so that `Critical > High > Normal > Low`, which is
/// the dispatch order of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Routine background activity
    Low,
    /// Normal business flow
    Normal,
    /// Elevated, needs prompt handling
    High,
    /// Outage-level, dispatched before everything else
    Critical,
}

impl Priority {
    /// All tiers, highest first (dispatch order).
    pub const DISPATCH_ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Returns the tier name.
    pub fn name(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Business category of a generated event or issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Incoming orders and quotes
    Orders,
    /// Production line activity
    Production,
    /// Shipping and warehouse movements
    Logistics,
    /// Invoicing and payments
    Billing,
    /// Customer support traffic
    Support,
}

impl EventCategory {
    /// Returns the category name.
    pub fn name(&self) -> &'static str {
        match self {
            EventCategory::Orders => "orders",
            EventCategory::Production => "production",
            EventCategory::Logistics => "logistics",
            EventCategory::Billing => "billing",
            EventCategory::Support => "support",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A generated event descriptor, immutable once created.
///
/// Descriptors describe volume and urgency, not message content: the
/// external sender renders them into whatever outbound format it speaks.
/// Each descriptor is consumed exactly once by the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Priority tier
    pub priority: Priority,
    /// Business category
    pub category: EventCategory,
    /// Target number of underlying business records this event represents
    pub target_count: u32,
    /// Simulated day of week (1..=7) at generation time
    pub sim_day: u8,
    /// Simulated hour of day (0..=23) at generation time
    pub sim_hour: u8,
}

impl EventDescriptor {
    /// Creates a new descriptor.
    pub fn new(
        priority: Priority,
        category: EventCategory,
        target_count: u32,
        sim_day: u8,
        sim_hour: u8,
    ) -> Self {
        Self {
            priority,
            category,
            target_count,
            sim_day,
            sim_hour,
        }
    }
}

/// Acknowledgement returned by the external sender on successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Unique receipt identifier assigned by the sender
    pub receipt_id: Uuid,
    /// Milliseconds since context start at which the sender accepted the event
    pub accepted_at_ms: u64,
}

impl DeliveryReceipt {
    /// Creates a receipt with a fresh id.
    pub fn new(accepted_at_ms: u64) -> Self {
        Self {
            receipt_id: Uuid::new_v4(),
            accepted_at_ms,
        }
    }
}
