//! Error types for the delivery boundary.

use thiserror::Error;

/// Errors returned by the external sender collaborator.
///
/// The dispatch consumer distinguishes the two variants: transient failures
/// are retried up to the configured bound, terminal failures drop the item
/// immediately.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Sender temporarily unavailable (connection refused, buffer full, ...)
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Sender permanently rejected the event (bad payload, closed channel, ...)
    #[error("terminal delivery failure: {0}")]
    Terminal(String),
}

impl DeliveryError {
    /// Creates a transient (retryable) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates a terminal (non-retryable) error.
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Whether the consumer may retry the send.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
