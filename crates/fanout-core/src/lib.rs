//! Core domain models for the webhook fan-out gateway.
//!
//! Provides the validated listener record, the delivery job value that
//! crosses the intake and dispatch boundaries, the compiled subscription
//! matcher, and the clock abstraction. The delivery and API crates both
//! build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod matcher;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use matcher::Matcher;
pub use models::{
    parse_event_path, DeliveryJob, Listener, Registration, RegistrationConfig, Timestamps,
};
pub use time::{Clock, SystemClock};
