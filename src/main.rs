//! Fanout webhook gateway.
//!
//! Main entry point for the gateway. Initializes all subsystems and
//! coordinates graceful startup and shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use fanout_api::{AppState, Config, MemoryStore, Registry};
use fanout_core::{Clock, SystemClock};
use fanout_delivery::{DeliveryClient, SenderWrapper, WorkerPool};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting fanout webhook gateway");

    let config = Config::load()?;
    let addr = config.parse_server_addr()?;
    info!(
        server_addr = %addr,
        intake_workers = config.intake_workers,
        sender_workers = config.sender_workers,
        sender_queue_size = config.sender_queue_size,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let client = DeliveryClient::new(config.to_client_config())
        .context("Failed to build the outbound delivery client")?;
    let wrapper = Arc::new(
        SenderWrapper::new(config.to_wrapper_config(), client, Arc::clone(&clock))
            .context("Failed to build the sender wrapper")?,
    );

    let store = Arc::new(MemoryStore::new(Arc::clone(&clock)));
    let registry = Arc::new(Registry::new(
        store,
        Arc::clone(&clock),
        std::time::Duration::from_secs(config.registration_ttl_seconds),
    ));
    let updater = registry.spawn_updater(Arc::clone(&wrapper));

    let intake_pool = Arc::new(
        WorkerPool::new(config.intake_workers, config.intake_queue_size)
            .context("Failed to build the intake worker pool")?,
    );

    let state = AppState::new(
        Arc::clone(&wrapper),
        Arc::clone(&intake_pool),
        registry,
        Arc::clone(&clock),
    );

    info!(addr = %addr, "Fanout is ready to receive events");

    if let Err(e) = fanout_api::start_server(state, &config, addr).await {
        error!(error = %e, "Server failed");
    }

    info!("Shutdown signal handled, draining dispatch queues");

    updater.abort();
    if let Ok(pool) = Arc::try_unwrap(intake_pool) {
        pool.shutdown().await;
    }
    wrapper.shutdown(true).await;

    info!("Fanout shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,fanout=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
