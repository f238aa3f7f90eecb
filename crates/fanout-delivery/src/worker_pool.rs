//! Fixed-size worker pool over a bounded, non-blocking job channel.
//!
//! The intake front door uses this primitive to decouple inbound request
//! latency from dispatch. `submit` never blocks: when the channel is full
//! the job is rejected and the caller reports overload upstream.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::error::{DeliveryError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size pool of workers draining a bounded job channel.
pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_workers` workers behind a channel of `queue_size` slots.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` when either parameter is zero.
    pub fn new(num_workers: usize, queue_size: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(DeliveryError::configuration("worker count must be positive"));
        }
        if queue_size == 0 {
            return Err(DeliveryError::configuration("queue size must be positive"));
        }

        let (jobs, rx) = mpsc::channel::<Job>(queue_size);
        let rx = Arc::new(Mutex::new(rx));

        info!(num_workers, queue_size, "spawning worker pool");

        let workers = (0..num_workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => job.await,
                            None => {
                                debug!(worker_id, "worker pool channel closed, worker exiting");
                                break;
                            },
                        }
                    }
                })
            })
            .collect();

        Ok(Self { jobs, workers })
    }

    /// Offers a job to the pool without blocking.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::PoolFull` when every queue slot is taken.
    pub fn submit(&self, job: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        self.jobs.try_send(Box::pin(job)).map_err(|_| DeliveryError::PoolFull)
    }

    /// Closes the job channel and waits for workers to drain it.
    pub async fn shutdown(mut self) {
        drop(self.jobs);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
    }
}
