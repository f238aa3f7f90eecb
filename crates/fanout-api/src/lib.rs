//! HTTP surface of the fanout gateway.
//!
//! Wires the intake endpoint, the listener registration endpoints, and the
//! registry adapter onto the dispatch engine, and carries the service
//! configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod registry;
pub mod server;

use std::sync::Arc;

use fanout_core::Clock;
use fanout_delivery::{SenderWrapper, WorkerPool};

pub use config::Config;
pub use registry::{ListenerStore, MemoryStore, Registry, RegistryError, StoreError, StoreItem};
pub use server::{create_router, start_server};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The dispatch engine.
    pub wrapper: Arc<SenderWrapper>,
    /// Front-door pool decoupling intake from dispatch.
    pub intake_pool: Arc<WorkerPool>,
    /// Listener registry adapter.
    pub registry: Arc<Registry>,
    /// Clock used for intake timestamps.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Bundles the collaborators handlers need.
    pub fn new(
        wrapper: Arc<SenderWrapper>,
        intake_pool: Arc<WorkerPool>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { wrapper, intake_pool, registry, clock }
    }
}
