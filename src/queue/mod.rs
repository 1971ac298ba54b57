//! Per-distributor serial queues.
//!
//! Each distributor wallet gets exactly one queue backed by a bounded
//! channel and drained by a dedicated worker task. Batches for one
//! distributor are processed strictly in order; a failed batch is retried in
//! place before anything behind it runs, which gives head-of-queue retry
//! semantics without re-inserting into the channel.
//!
//! # Lifecycle
//!
//! A queue is spawned active. `quit` flips the active flag and cancels the
//! worker's token: the batch in flight finishes its current attempt, then
//! the worker drains and discards whatever is still queued, logging the
//! count. `enqueue` rejects new work as soon as the flag is down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::gateway::{BlockchainGateway, SettingsStore};
use crate::sender::{BatchSender, SendError};
use crate::types::{Batch, Distributor, DistributorId};

/// Default bound on queued batches per distributor.
const DEFAULT_CAPACITY: usize = 256;

/// Default pause before each batch, clustering near-simultaneous arrivals.
const DEFAULT_IDLE_GAP_MS: u64 = 100;

/// Default pause before retrying a failed batch.
const DEFAULT_REQUEUE_DELAY_SECS: u64 = 5;

/// Default number of attempts before a batch is dropped for good.
const DEFAULT_MAX_ITEM_RETRIES: u32 = 10;

/// Configuration for distributor queues.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bound on queued batches; admission fails beyond it.
    pub capacity: usize,

    /// Pause before each batch is processed.
    pub idle_gap: Duration,

    /// Pause before a failed batch is retried.
    pub requeue_delay: Duration,

    /// Attempts before a batch is dropped as permanently failed.
    pub max_item_retries: u32,
}

impl QueueConfig {
    pub fn new() -> Self {
        QueueConfig {
            capacity: DEFAULT_CAPACITY,
            idle_gap: Duration::from_millis(DEFAULT_IDLE_GAP_MS),
            requeue_delay: Duration::from_secs(DEFAULT_REQUEUE_DELAY_SECS),
            max_item_retries: DEFAULT_MAX_ITEM_RETRIES,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced by [`DistributorQueue::enqueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was shut down and accepts no further work.
    #[error("queue for distributor {0} is closed")]
    Closed(DistributorId),

    /// The queue's channel is at capacity.
    #[error("queue for distributor {0} is full")]
    Full(DistributorId),
}

/// A batch handed back by a failed admission.
#[derive(Debug)]
pub struct RejectedBatch {
    pub error: QueueError,
    pub batch: Batch,
}

/// A serial work queue bound to one distributor wallet.
pub struct DistributorQueue {
    id: DistributorId,
    tx: mpsc::Sender<Batch>,
    depth: Arc<AtomicUsize>,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DistributorQueue {
    /// Spawns a queue and its worker task.
    ///
    /// The worker's cancellation token is a child of `parent`, so a
    /// dispatcher-wide shutdown reaches every queue.
    pub fn spawn<G, S>(
        distributor: Distributor,
        sender: Arc<BatchSender<G, S>>,
        config: QueueConfig,
        parent: &CancellationToken,
    ) -> Self
    where
        G: BlockchainGateway + 'static,
        S: SettingsStore + 'static,
    {
        let id = distributor.id;
        let (tx, rx) = mpsc::channel(config.capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicBool::new(true));
        let cancel = parent.child_token();

        let worker = QueueWorker {
            distributor,
            sender,
            config,
            depth: depth.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run(rx));

        DistributorQueue {
            id,
            tx,
            depth,
            active,
            cancel,
            task,
        }
    }

    pub fn id(&self) -> DistributorId {
        self.id
    }

    /// Queued plus in-flight batches. Used for load balancing.
    pub fn size(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Appends a batch to the queue.
    ///
    /// Thread-safe; fails once the queue has been shut down or is at
    /// capacity, handing the batch back to the caller.
    pub fn enqueue(&self, batch: Batch) -> Result<(), RejectedBatch> {
        if !self.is_active() {
            return Err(RejectedBatch {
                error: QueueError::Closed(self.id),
                batch,
            });
        }

        // Count before sending so a fast worker cannot observe a negative
        // depth between send and increment.
        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(batch) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                let (error, batch) = match err {
                    mpsc::error::TrySendError::Closed(batch) => {
                        (QueueError::Closed(self.id), batch)
                    }
                    mpsc::error::TrySendError::Full(batch) => (QueueError::Full(self.id), batch),
                };
                Err(RejectedBatch { error, batch })
            }
        }
    }

    /// Signals the worker to stop after its current batch.
    pub fn quit(&self) {
        self.active.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    /// Shuts the queue down and waits for the worker, up to `deadline`.
    pub async fn shutdown(self, deadline: Duration) {
        self.quit();
        if tokio::time::timeout(deadline, self.task).await.is_err() {
            warn!(distributor = %self.id, "queue worker did not stop within deadline");
        }
    }
}

/// The worker task owning a queue's receiving end.
struct QueueWorker<G, S> {
    distributor: Distributor,
    sender: Arc<BatchSender<G, S>>,
    config: QueueConfig,
    depth: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl<G, S> QueueWorker<G, S>
where
    G: BlockchainGateway,
    S: SettingsStore,
{
    #[instrument(skip(self, rx), fields(distributor = %self.distributor.id))]
    async fn run(self, mut rx: mpsc::Receiver<Batch>) {
        info!("queue worker started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                batch = rx.recv() => match batch {
                    Some(batch) => self.process(batch).await,
                    None => break,
                }
            }
        }

        // Discard whatever is still queued.
        let mut discarded = 0usize;
        while rx.try_recv().is_ok() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "discarding undrained batches on shutdown");
        }

        info!("queue worker stopped");
    }

    /// Processes one batch to completion, retrying in place on failure.
    async fn process(&self, mut batch: Batch) {
        let tag = batch.tag.clone();

        loop {
            if self.sleep(self.config.idle_gap).await.is_err() {
                warn!(%tag, remaining = batch.ops.len(), "batch discarded by shutdown");
                break;
            }

            match self
                .sender
                .send(
                    &self.distributor,
                    &mut batch.ops,
                    batch.memo.as_deref(),
                    &batch.issuers,
                    &batch.tag,
                    &self.cancel,
                )
                .await
            {
                Ok(()) => {
                    debug!(%tag, "batch completed");
                    break;
                }
                Err(SendError::Cancelled) => {
                    warn!(%tag, remaining = batch.ops.len(), "batch interrupted by shutdown");
                    break;
                }
                Err(err) => {
                    batch.retry_count += 1;
                    if batch.retry_count >= self.config.max_item_retries {
                        error!(
                            %tag,
                            retries = batch.retry_count,
                            remaining = batch.ops.len(),
                            error = %err,
                            "batch permanently failed, dropping"
                        );
                        break;
                    }

                    warn!(
                        %tag,
                        retries = batch.retry_count,
                        error = %err,
                        "batch failed, retrying at head of queue"
                    );
                    if self.sleep(self.config.requeue_delay).await.is_err() {
                        warn!(%tag, remaining = batch.ops.len(), "batch discarded by shutdown");
                        break;
                    }
                }
            }
        }

        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    async fn sleep(&self, duration: Duration) -> Result<(), ()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
