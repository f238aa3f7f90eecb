//! Webhook fan-out dispatch engine.
//!
//! Maintains one [`OutboundSender`] per registered listener and routes each
//! inbound event to every sender whose subscription matches. Queues are
//! bounded and in-memory: under overload a sender drops jobs and notifies
//! its failure URL instead of applying backpressure to the intake path.
//!
//! # Dispatch Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!                      │        SenderWrapper         │
//!                      │  URL -> OutboundSender map   │
//!                      │  (reconciled from registry)  │
//!                      └──────────────────────────────┘
//!                                     │
//!                            matcher fan-out
//!                                     │
//!                  ┌──────────────────┼──────────────────┐
//!                  ▼                  ▼                  ▼
//!          ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!          │   Sender A   │   │   Sender B   │   │   Sender N   │
//!          │ bounded FIFO │   │ bounded FIFO │   │ bounded FIFO │
//!          │ worker pool  │   │ worker pool  │   │ worker pool  │
//!          └──────────────┘   └──────────────┘   └──────────────┘
//!                  │                  │                  │
//!                  ▼                  ▼                  ▼
//!           listener URL A     listener URL B     listener URL N
//! ```
//!
//! Key properties:
//! - **Isolation**: a slow or failing listener only ever fills its own
//!   queue; other senders and the inbound path are unaffected.
//! - **Lossy overload handling**: enqueue never blocks; overflow triggers a
//!   rate-limited cut-off notification to the listener's failure URL.
//! - **Lingering eviction**: expired senders are retained for a grace
//!   period so a registry snapshot that briefly omits a listener does not
//!   tear down its pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod sender;
pub mod signing;
pub mod worker_pool;
pub mod wrapper;

pub use client::{ClientConfig, DeliveryClient, DeliveryOutcome, OutboundRequest};
pub use error::{DeliveryError, Result};
pub use sender::{OutboundSender, SenderConfig};
pub use worker_pool::WorkerPool;
pub use wrapper::{SenderWrapper, WrapperConfig};

/// Default number of workers draining each sender's queue.
pub const DEFAULT_WORKERS_PER_SENDER: usize = 10;

/// Default capacity of each sender's delivery queue.
pub const DEFAULT_QUEUE_SIZE_PER_SENDER: usize = 100;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
