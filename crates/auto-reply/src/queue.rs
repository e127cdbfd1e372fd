//! Per-conversation work queues.
//!
//! Operations within one conversation (ingest → bot decision → dispatch,
//! including the configurable reply delay) must run one at a time and in
//! arrival order. Distinct conversations must not wait on each other. Each
//! key gets a dedicated worker task fed by an unbounded channel; enqueueing
//! is synchronous, so arrival order is preserved. Workers retire after an
//! idle period and are re-created on the next enqueue, so the map tracks
//! active conversations rather than every contact ever seen.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use {dashmap::DashMap, tokio::sync::mpsc};

/// How long a worker waits for more jobs before retiring.
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// FIFO work queues keyed by conversation (tenant + contact address).
pub struct ConversationQueues {
    workers: Arc<DashMap<String, mpsc::UnboundedSender<Job>>>,
    idle_timeout: Duration,
}

impl Default for ConversationQueues {
    fn default() -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            idle_timeout: WORKER_IDLE_TIMEOUT,
        }
    }
}

impl ConversationQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Queue a job for `key`. Jobs for the same key run sequentially in
    /// enqueue order; jobs for different keys run concurrently.
    pub fn enqueue(&self, key: &str, job: impl Future<Output = ()> + Send + 'static) {
        let mut job: Job = Box::pin(job);
        loop {
            let sender = self
                .workers
                .entry(key.to_string())
                .or_insert_with(|| self.spawn_worker(key.to_string()))
                .clone();
            match sender.send(job) {
                Ok(()) => return,
                // The worker retired between lookup and send. Drop its map
                // entry (unless a fresh worker already replaced it) and
                // retry with the job handed back.
                Err(mpsc::error::SendError(returned)) => {
                    self.workers.remove_if(key, |_, s| s.same_channel(&sender));
                    job = returned;
                },
            }
        }
    }

    fn spawn_worker(&self, key: String) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let workers = Arc::clone(&self.workers);
        let worker_tx = tx.clone();
        let idle_timeout = self.idle_timeout;
        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(job)) => job.await,
                    Ok(None) => break,
                    Err(_) => {
                        // Retire: deregister first, then close the channel
                        // so a racing enqueue either lands in the drain
                        // below or fails its send and re-creates a worker.
                        workers.remove_if(&key, |_, s| s.same_channel(&worker_tx));
                        rx.close();
                        while let Some(job) = rx.recv().await {
                            job.await;
                        }
                        break;
                    },
                }
            }
        });
        tx
    }
}
