//! Outbound sender abstraction for dispatched events.

use crate::error::DeliveryError;
use crate::types::{DeliveryReceipt, EventDescriptor};
use async_trait::async_trait;

/// Abstraction for the external channel that receives dispatched events.
///
/// # Implementations
///
/// - **Production**: wraps a messaging client or HTTP endpoint
/// - **Test**: collecting/failing sinks that record or reject deliveries
///
/// # Delivery Flow
///
/// ```text
/// DispatchQueue                 Sink                    External channel
///   |                             |                          |
///   |-- deliver(descriptor) ----->|                          |
///   |                             |-- [render + transmit] -->|
///   |<-- Ok(receipt) / Err(e) ----|                          |
/// ```
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Delivers one event descriptor to the external channel.
    ///
    /// # Arguments
    /// * `event` - The descriptor to deliver
    ///
    /// # Returns
    /// * `Ok(DeliveryReceipt)` - The channel accepted the event
    /// * `Err(DeliveryError::Transient)` - Temporary failure, safe to retry
    /// * `Err(DeliveryError::Terminal)` - Permanent rejection, do not retry
    ///
    /// # Context
    /// Called only from the dispatch queue's single consumer task; the
    /// implementation does not need to be reentrant per event.
    async fn deliver(&self, event: &EventDescriptor) -> Result<DeliveryReceipt, DeliveryError>;
}
