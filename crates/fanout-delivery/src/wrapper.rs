//! Aggregate sender wrapper owning the live dispatch set.
//!
//! The wrapper maps listener URL to [`OutboundSender`] and reconciles that
//! map against registry snapshots: new URLs get senders, re-registered URLs
//! get their deadline extended (or the sender replaced when anything else
//! changed), and vanished URLs linger until their deadline plus a grace
//! period has passed, which absorbs brief registry gaps without dropping
//! in-flight deliveries.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
    time::Duration,
};

use fanout_core::{parse_event_path, Clock, DeliveryJob, Listener};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::DeliveryClient,
    error::{DeliveryError, Result},
    sender::{OutboundSender, SenderConfig},
};

/// How often the reaper sweeps for lingered-out senders.
const REAPER_INTERVAL: Duration = Duration::from_secs(2);

/// Construction parameters for the wrapper and every sender it creates.
#[derive(Debug, Clone)]
pub struct WrapperConfig {
    /// Workers draining each sender's queue.
    pub num_workers_per_sender: usize,
    /// Capacity of each sender's delivery queue.
    pub queue_size_per_sender: usize,
    /// Minimum interval between a sender's failure-URL notifications.
    pub cut_off_period: Duration,
    /// Grace period an expired sender is retained before eviction.
    pub linger: Duration,
}

/// Owner of the dispatch set.
pub struct SenderWrapper {
    sender_config: SenderConfig,
    linger: chrono::Duration,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
    senders: Arc<RwLock<HashMap<String, OutboundSender>>>,
    cancel: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl SenderWrapper {
    /// Creates the wrapper and starts the background reaper.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` when any parameter is zero.
    pub fn new(
        config: WrapperConfig,
        client: DeliveryClient,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.num_workers_per_sender == 0 {
            return Err(DeliveryError::configuration("workers per sender must be positive"));
        }
        if config.queue_size_per_sender == 0 {
            return Err(DeliveryError::configuration("queue size per sender must be positive"));
        }
        if config.cut_off_period.is_zero() {
            return Err(DeliveryError::configuration("cut-off period must be positive"));
        }
        if config.linger.is_zero() {
            return Err(DeliveryError::configuration("linger must be positive"));
        }

        let linger = chrono::Duration::from_std(config.linger)
            .map_err(|e| DeliveryError::configuration(format!("linger out of range: {e}")))?;

        let senders: Arc<RwLock<HashMap<String, OutboundSender>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let reaper = tokio::spawn(reaper_loop(
            Arc::clone(&senders),
            Arc::clone(&clock),
            linger,
            cancel.clone(),
        ));

        Ok(Self {
            sender_config: SenderConfig {
                num_workers: config.num_workers_per_sender,
                queue_size: config.queue_size_per_sender,
                cut_off_period: config.cut_off_period,
            },
            linger,
            client,
            clock,
            senders,
            cancel,
            reaper: Mutex::new(Some(reaper)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Reconciles the dispatch set against a registry snapshot.
    ///
    /// Listeners already present with an unchanged configuration get their
    /// deadline extended. A changed configuration replaces the sender under
    /// the same URL; the retired sender is stopped without draining.
    /// Invalid records are logged and ignored. Senders missing from the
    /// snapshot are left to the reaper.
    pub async fn update(&self, list: Vec<Listener>) {
        let mut retired = Vec::new();
        {
            let mut senders = self.senders.write().await;
            for listener in list {
                let unchanged = senders
                    .get(&listener.url)
                    .is_some_and(|existing| existing.listener().same_config(&listener));
                if unchanged {
                    if let Some(existing) = senders.get(&listener.url) {
                        existing.extend(listener.until);
                    }
                    continue;
                }

                let replacing = senders.contains_key(&listener.url);
                match OutboundSender::new(
                    listener.clone(),
                    self.client.clone(),
                    &self.sender_config,
                    Arc::clone(&self.clock),
                ) {
                    Ok(sender) => {
                        debug!(url = %listener.url, replacing, "sender joined dispatch set");
                        if let Some(old) = senders.insert(listener.url.clone(), sender) {
                            retired.push(old);
                        }
                    },
                    Err(e) => {
                        warn!(
                            url = %listener.url,
                            error = %e,
                            "ignoring invalid listener registration"
                        );
                    },
                }
            }
        }

        for old in retired {
            old.shutdown(false).await;
        }
    }

    /// Routes one inbound event to every sender whose matcher accepts it.
    ///
    /// The event name and device id are lifted out of the job's target URL
    /// here; senders filter internally.
    pub async fn queue(&self, mut job: DeliveryJob) {
        let (event, device_id) = parse_event_path(&job.target_url);
        job.event = event;
        job.device_id = device_id;

        let senders = self.senders.read().await;
        for sender in senders.values() {
            sender.queue(&job);
        }
    }

    /// Number of senders currently in the dispatch set.
    pub async fn sender_count(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Stops the reaper and shuts down every sender. Idempotent.
    ///
    /// With `drain` each sender finishes its queued deliveries first,
    /// subject to its own delivery deadline.
    pub async fn shutdown(&self, drain: bool) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        if let Some(handle) = self.reaper.lock().await.take() {
            let _ = handle.await;
        }

        let drained: Vec<OutboundSender> =
            self.senders.write().await.drain().map(|(_, sender)| sender).collect();
        info!(senders = drained.len(), drain, "shutting down dispatch set");
        for sender in drained {
            sender.shutdown(drain).await;
        }
    }

    /// Grace period an expired sender is retained before eviction.
    pub fn linger(&self) -> chrono::Duration {
        self.linger
    }
}

/// Periodically evicts senders whose deadline plus linger has passed.
async fn reaper_loop(
    senders: Arc<RwLock<HashMap<String, OutboundSender>>>,
    clock: Arc<dyn Clock>,
    linger: chrono::Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = clock.sleep(REAPER_INTERVAL) => {},
        }

        let now = clock.now_utc();
        let evicted: Vec<OutboundSender> = {
            let mut senders = senders.write().await;
            let expired: Vec<String> = senders
                .iter()
                .filter(|(_, sender)| sender.deliver_until() + linger < now)
                .map(|(url, _)| url.clone())
                .collect();
            expired.into_iter().filter_map(|url| senders.remove(&url)).collect()
        };

        for sender in evicted {
            info!(url = %sender.listener().url, "evicting expired sender");
            sender.shutdown(true).await;
        }
    }
}
