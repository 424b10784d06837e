//! Error types for the core engines.

use thiserror::Error;

/// Configuration errors, rejected synchronously at call time with no state
/// change.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Requested speed level is outside the table
    #[error("speed level {level} is invalid (valid: 1..={max})")]
    InvalidSpeedLevel {
        /// The rejected level
        level: u8,
        /// Highest valid level
        max: u8,
    },

    /// Speed multiplier table violates its invariants
    #[error("invalid speed table: {0}")]
    InvalidSpeedTable(String),

    /// Rate limiter configuration violates its invariants
    #[error("invalid rate limit config: {0}")]
    InvalidRateLimit(String),
}

impl ConfigError {
    /// Creates a speed-table error.
    pub fn speed_table(msg: impl Into<String>) -> Self {
        Self::InvalidSpeedTable(msg.into())
    }

    /// Creates a rate-limit error.
    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::InvalidRateLimit(msg.into())
    }
}

/// Unexpected failure inside a scenario-generation or orchestration tick.
///
/// Caught at the tick boundary, counted against the worker's error counter,
/// never propagated out of the drive loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TickError {
    /// Calendar position handed to the generator was out of range
    #[error("calendar position out of range: day {day}, hour {hour}")]
    CalendarOutOfRange {
        /// Offending day
        day: u8,
        /// Offending hour
        hour: u8,
    },
}
