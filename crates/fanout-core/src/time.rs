//! Time abstractions for testable expiry and linger handling.
//!
//! Senders compare wall-clock deadlines and rate-limit notifications on a
//! monotonic clock. Injecting the clock keeps both behaviors controllable
//! in tests.

use std::{
    future::Future,
    pin::Pin,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
///
/// Production code uses [`SystemClock`]; tests can inject controllable
/// implementations to exercise expiry and linger without real waiting.
pub trait Clock: Send + Sync {
    /// Returns the current monotonic instant for interval measurements.
    fn now(&self) -> Instant;

    /// Returns the current wall-clock time for deadlines and display.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock implementation backed by the system time and tokio's sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
