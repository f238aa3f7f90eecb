//! Per-listener outbound sender.
//!
//! One `OutboundSender` exists for each active listener. It owns a bounded
//! FIFO queue of prepared deliveries, a pool of workers draining that queue
//! through the shared HTTP client, a delivery deadline, and the cut-off
//! machinery that notifies the listener's failure URL when the queue
//! overflows.
//!
//! Queues are lossy by design: enqueue never blocks, and anything the
//! listener cannot absorb is dropped after the cut-off episode fires.

use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use fanout_core::{Clock, DeliveryJob, Listener, Matcher};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{DeliveryClient, OutboundRequest},
    error::{DeliveryError, Result},
    signing,
};

/// Shared dispatch parameters applied to every sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Workers draining each sender's queue.
    pub num_workers: usize,
    /// Capacity of each sender's delivery queue.
    pub queue_size: usize,
    /// Minimum interval between failure-URL notifications.
    pub cut_off_period: Duration,
}

/// Active dispatcher for one listener.
pub struct OutboundSender {
    shared: Arc<SenderShared>,
    queue_tx: mpsc::Sender<DeliveryJob>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

struct SenderShared {
    listener: Listener,
    matcher: Matcher,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
    /// Delivery deadline as wall-clock microseconds. Monotone: only ever
    /// raised, via `fetch_max`.
    deliver_until_micros: AtomicI64,
    /// Monotonic base for the cut-off rate limit.
    started: Instant,
    /// Milliseconds since `started` of the last cut-off notification.
    /// Zero means none has fired yet.
    last_cut_off_ms: AtomicU64,
    cut_off_period: Duration,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl OutboundSender {
    /// Validates the listener and dispatch parameters, compiles the
    /// matcher, and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` for zero worker count, queue
    /// size, or cut-off period, and `DeliveryError::InvalidListener` when
    /// the listener record fails validation. No sender is created on error.
    pub fn new(
        listener: Listener,
        client: DeliveryClient,
        config: &SenderConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.num_workers == 0 {
            return Err(DeliveryError::configuration("sender worker count must be positive"));
        }
        if config.queue_size == 0 {
            return Err(DeliveryError::configuration("sender queue size must be positive"));
        }
        if config.cut_off_period.is_zero() {
            return Err(DeliveryError::configuration("cut-off period must be positive"));
        }

        let matcher = listener.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_size);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let cancel = CancellationToken::new();

        let shared = Arc::new(SenderShared {
            deliver_until_micros: AtomicI64::new(listener.until.timestamp_micros()),
            started: clock.now(),
            last_cut_off_ms: AtomicU64::new(0),
            cut_off_period: config.cut_off_period,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            listener,
            matcher,
            client,
            clock,
        });

        let workers = (0..config.num_workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&shared),
                    Arc::clone(&queue_rx),
                    cancel.clone(),
                ))
            })
            .collect();

        debug!(
            url = %shared.listener.url,
            num_workers = config.num_workers,
            queue_size = config.queue_size,
            "outbound sender started"
        );

        Ok(Self { shared, queue_tx, workers, cancel })
    }

    /// Offers a job to this sender without blocking.
    ///
    /// Jobs past the delivery deadline and jobs the matcher rejects are
    /// dropped silently. A full queue triggers the cut-off episode and
    /// drops the job.
    pub fn queue(&self, job: &DeliveryJob) {
        let now = self.shared.clock.now_utc();
        if now.timestamp_micros() > self.shared.deliver_until_micros.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(url = %self.shared.listener.url, "listener expired, dropping job");
            return;
        }

        if !self.shared.matcher.accepts(&job.event, &job.device_id) {
            return;
        }

        match self.queue_tx.try_send(job.clone()) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                cut_off(&self.shared);
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }

    /// Raises the delivery deadline to `until` if it is later than the
    /// current one. Earlier values are a no-op; the deadline never shrinks.
    pub fn extend(&self, until: DateTime<Utc>) {
        self.shared
            .deliver_until_micros
            .fetch_max(until.timestamp_micros(), Ordering::AcqRel);
    }

    /// Current delivery deadline.
    pub fn deliver_until(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.shared.deliver_until_micros.load(Ordering::Acquire))
            .unwrap_or_default()
    }

    /// The listener record this sender was built from.
    pub fn listener(&self) -> &Listener {
        &self.shared.listener
    }

    /// Number of deliveries accepted by the endpoint with a 2xx.
    pub fn delivered_count(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Number of jobs dropped for any reason: expiry, overflow, rejection,
    /// or transport failure.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stops this sender.
    ///
    /// With `drain` the queue is closed and workers finish the remaining
    /// jobs, each still honoring the delivery deadline at pop time. Without
    /// it workers are cancelled immediately and queued and in-flight work
    /// is abandoned.
    pub async fn shutdown(self, drain: bool) {
        self.shutdown_within(drain, None).await;
    }

    /// Stops this sender, abandoning workers that outlive `deadline`.
    pub async fn shutdown_within(mut self, drain: bool, deadline: Option<Duration>) {
        drop(self.queue_tx);
        if !drain {
            self.cancel.cancel();
        }

        let mut workers = std::mem::take(&mut self.workers);
        let join_all = async move {
            for handle in workers.drain(..) {
                let _ = handle.await;
            }
        };

        match deadline {
            Some(limit) => {
                if tokio::time::timeout(limit, join_all).await.is_err() {
                    warn!(
                        url = %self.shared.listener.url,
                        timeout_ms = limit.as_millis() as u64,
                        "shutdown deadline exceeded, abandoning workers"
                    );
                    self.cancel.cancel();
                }
            },
            None => join_all.await,
        }

        info!(url = %self.shared.listener.url, drain, "outbound sender stopped");
    }
}

/// Runs one cut-off episode for a sender whose enqueue just overflowed.
///
/// Every overflow logs; at most one failure-URL notification fires per
/// cut-off period, enforced with a compare-and-set on the last
/// notification timestamp.
fn cut_off(shared: &Arc<SenderShared>) {
    // +1 keeps zero reserved as the "never notified" sentinel.
    let now_ms =
        shared.clock.now().saturating_duration_since(shared.started).as_millis() as u64 + 1;
    let period_ms = shared.cut_off_period.as_millis() as u64;

    let last = shared.last_cut_off_ms.load(Ordering::Acquire);
    if last != 0 && now_ms.saturating_sub(last) < period_ms {
        debug!(url = %shared.listener.url, "delivery queue still full, dropping job");
        return;
    }
    if shared
        .last_cut_off_ms
        .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        // Another overflow won the race; its notification covers this one.
        return;
    }

    error!(url = %shared.listener.url, "delivery queue full, listener cut off");

    let Some(failure_url) = shared.listener.failure_url.clone() else {
        error!(url = %shared.listener.url, "no cut-off notification URL configured");
        return;
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let stamp = shared.clock.now_utc().to_rfc3339_opts(SecondsFormat::Secs, true);
        let text = format!("Webhook fired cut-off for URL {} at {}", shared.listener.url, stamp);
        let body = Bytes::from(serde_json::json!({ "text": text }).to_string());
        let signature = shared
            .listener
            .secret
            .as_ref()
            .map(|secret| signing::signature_header(secret.as_bytes(), &body));

        match shared.client.notify_cut_off(&failure_url, body, signature).await {
            Ok(status) => warn!(
                url = %shared.listener.url,
                failure_url = %failure_url,
                status,
                "sent cut-off notification"
            ),
            Err(e) => error!(
                url = %shared.listener.url,
                failure_url = %failure_url,
                error = %e,
                "unable to send cut-off notification"
            ),
        }
    });
}

impl SenderShared {
    /// Performs one outbound POST for a popped job.
    async fn deliver(&self, worker_id: usize, job: DeliveryJob) {
        let content_type = if self.listener.content_type.is_empty() {
            job.content_type.clone()
        } else {
            self.listener.content_type.clone()
        };
        let signature = self
            .listener
            .secret
            .as_ref()
            .map(|secret| signing::signature_header(secret.as_bytes(), &job.payload));

        let request = OutboundRequest {
            url: self.listener.url.clone(),
            content_type,
            event: job.event.clone(),
            device_id: job.device_id.clone(),
            transaction_id: job.transaction_id.clone(),
            signature,
            body: job.payload.clone(),
        };

        match self.client.deliver(request).await {
            Ok(outcome) if outcome.is_success => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            },
            Ok(outcome) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id,
                    url = %self.listener.url,
                    status = outcome.status,
                    transaction_id = %job.transaction_id,
                    "delivery rejected, discarding job"
                );
            },
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id,
                    url = %self.listener.url,
                    error = %e,
                    transaction_id = %job.transaction_id,
                    "delivery failed, discarding job"
                );
            },
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<SenderShared>,
    queue_rx: Arc<Mutex<mpsc::Receiver<DeliveryJob>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            () = cancel.cancelled() => break,
            job = async { queue_rx.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };

        // Deadline re-checked at pop time so a drained shutdown never
        // delivers past the listener's expiry.
        let now = shared.clock.now_utc();
        if now.timestamp_micros() > shared.deliver_until_micros.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, url = %shared.listener.url, "deadline passed, dropping queued job");
            continue;
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = shared.deliver(worker_id, job) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fanout_core::SystemClock;

    use super::*;

    fn test_listener() -> Listener {
        Listener {
            url: "http://localhost:9999/foo".to_string(),
            content_type: "application/json".to_string(),
            secret: None,
            events: vec!["iot".to_string(), "test".to_string()],
            matchers: HashMap::new(),
            until: Utc::now() + chrono::Duration::seconds(60),
            failure_url: None,
            address: String::new(),
        }
    }

    fn test_config() -> SenderConfig {
        SenderConfig {
            num_workers: 2,
            queue_size: 10,
            cut_off_period: Duration::from_secs(1),
        }
    }

    fn new_sender(listener: Listener, config: &SenderConfig) -> Result<OutboundSender> {
        OutboundSender::new(
            listener,
            DeliveryClient::with_defaults().unwrap(),
            config,
            Arc::new(SystemClock::new()),
        )
    }

    #[tokio::test]
    async fn zero_cut_off_period_rejected() {
        let config = SenderConfig { cut_off_period: Duration::ZERO, ..test_config() };
        assert!(new_sender(test_listener(), &config).is_err());
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let config = SenderConfig { num_workers: 0, ..test_config() };
        assert!(new_sender(test_listener(), &config).is_err());
    }

    #[tokio::test]
    async fn zero_queue_size_rejected() {
        let config = SenderConfig { queue_size: 0, ..test_config() };
        assert!(new_sender(test_listener(), &config).is_err());
    }

    #[tokio::test]
    async fn invalid_listener_url_rejected() {
        let listener = Listener { url: "invalid".to_string(), ..test_listener() };
        assert!(new_sender(listener, &test_config()).is_err());

        let listener = Listener { url: String::new(), ..test_listener() };
        assert!(new_sender(listener, &test_config()).is_err());
    }

    #[tokio::test]
    async fn invalid_event_regex_rejected() {
        let listener = Listener { events: vec!["iot(.*".to_string()], ..test_listener() };
        assert!(new_sender(listener, &test_config()).is_err());
    }

    #[tokio::test]
    async fn missing_events_rejected() {
        let listener = Listener { events: Vec::new(), ..test_listener() };
        assert!(new_sender(listener, &test_config()).is_err());
    }

    #[tokio::test]
    async fn invalid_failure_url_rejected() {
        let listener =
            Listener { failure_url: Some("invalid".to_string()), ..test_listener() };
        assert!(new_sender(listener, &test_config()).is_err());
    }

    #[tokio::test]
    async fn extend_is_monotone() {
        let until = Utc::now();
        let listener = Listener { until, ..test_listener() };
        let sender = new_sender(listener, &test_config()).unwrap();

        assert_eq!(sender.deliver_until().timestamp_micros(), until.timestamp_micros());

        // Earlier values, including the epoch, leave the deadline alone.
        sender.extend(DateTime::<Utc>::default());
        assert_eq!(sender.deliver_until().timestamp_micros(), until.timestamp_micros());

        let extended = until + chrono::Duration::seconds(10);
        sender.extend(extended);
        assert_eq!(sender.deliver_until().timestamp_micros(), extended.timestamp_micros());

        sender.shutdown(true).await;
    }
}
