//! Error types for listener validation and job construction.
//!
//! Every error here is a configuration error: it is raised once, when a
//! listener record is built, and the offending record never reaches the
//! dispatch set. The hot dispatch path does not produce `CoreError`s.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Validation errors raised while constructing a listener record.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Listener URL is missing, relative, or otherwise unusable.
    #[error("invalid listener URL {url:?}: {reason}")]
    InvalidUrl {
        /// The URL as supplied by the registrant
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Listener subscribed to no events at all.
    #[error("listener must subscribe to at least one event")]
    NoEvents,

    /// An event subscription regex failed to compile.
    #[error("invalid event regex {pattern:?}")]
    InvalidEventRegex {
        /// The offending pattern
        pattern: String,
        /// Compilation failure detail
        #[source]
        source: regex::Error,
    },

    /// A device-id matcher regex failed to compile.
    #[error("invalid device_id matcher regex {pattern:?}")]
    InvalidMatcherRegex {
        /// The offending pattern
        pattern: String,
        /// Compilation failure detail
        #[source]
        source: regex::Error,
    },

    /// The failure URL was supplied but is not a usable URL.
    #[error("invalid failure URL {url:?}: {reason}")]
    InvalidFailureUrl {
        /// The URL as supplied by the registrant
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The registration payload could not be decoded at all.
    #[error("invalid registration payload: {0}")]
    InvalidRegistration(String),
}
