//! Error types for the dispatch engine.
//!
//! Configuration errors are fatal at sender construction; everything else
//! is recovered locally so one listener's misbehavior never affects
//! another or the inbound path.

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised by senders, the wrapper, and the worker pool.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Sender or wrapper parameters failed validation.
    #[error("invalid dispatch configuration: {message}")]
    Configuration {
        /// What was wrong with the configuration
        message: String,
    },

    /// Listener record failed validation.
    #[error(transparent)]
    InvalidListener(#[from] fanout_core::CoreError),

    /// The front-door worker pool rejected a job because its queue is full.
    #[error("worker pool is full")]
    PoolFull,

    /// Network-level failure while delivering.
    #[error("network error: {message}")]
    Network {
        /// Transport failure detail
        message: String,
    },

    /// Delivery request timed out.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds elapsed before the request was abandoned
        timeout_seconds: u64,
    },
}

impl DeliveryError {
    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }
}
