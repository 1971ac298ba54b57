//! Fleet management and load-balanced admission.
//!
//! The dispatcher owns every distributor queue and exposes one operation:
//! submit operations for distribution. Submission is synchronous with
//! respect to admission (the caller learns whether its operations reached a
//! queue) and asynchronous with respect to settlement (queue workers drive
//! the batches from there).
//!
//! # Architecture
//!
//! ```text
//!                                   ┌──────────────────────────┐
//!                              ┌──► │  distributor 1 queue     │ ──► worker 1
//!                              │    └──────────────────────────┘
//! ┌────────────┐   ┌────────┐  │
//! │  submit()  │──►│ chunk  │──┤    ┌──────────────────────────┐
//! │  (callers) │   │ ≤100,  │  └──► │  distributor 2 queue     │ ──► worker 2
//! └────────────┘   │ least- │       └──────────────────────────┘
//!                  │ loaded │
//!                  └────────┘       (refresh task reconciles the fleet
//!                                    against the registry every 60 s)
//! ```
//!
//! # Locking
//!
//! One admission mutex guards the queue map and the pending buffer for the
//! whole of `submit` and for registry mutations, so the load-balancing
//! invariant (the chosen queue is no larger than any other at admission
//! time) holds without reshuffling. The issuer set is refreshed separately
//! and snapshotted into every admitted batch.


use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::gateway::{BlockchainGateway, DistributorRegistry, SettingsStore};
use crate::queue::{DistributorQueue, QueueConfig, QueueError};
use crate::sender::{BatchSender, SenderConfig};
use crate::types::{Batch, Distributor, DistributorId, DistributorRecord, Issuer, Operation, Tag};

/// Default interval between fleet refreshes (seconds).
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default grace period for queue workers on shutdown (seconds).
const DEFAULT_SHUTDOWN_DEADLINE_SECS: u64 = 10;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Interval between registry/issuer refreshes.
    pub refresh_interval: Duration,

    /// Grace period for queue workers on shutdown.
    pub shutdown_deadline: Duration,

    /// Per-queue configuration.
    pub queue: QueueConfig,

    /// Batch sender configuration.
    pub sender: SenderConfig,
}

impl DispatcherConfig {
    pub fn new() -> Self {
        DispatcherConfig {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            shutdown_deadline: Duration::from_secs(DEFAULT_SHUTDOWN_DEADLINE_SECS),
            queue: QueueConfig::new(),
            sender: SenderConfig::new(),
        }
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads `PAYOUT_DISPATCH_REFRESH_INTERVAL_SECS` and
    /// `PAYOUT_DISPATCH_SHUTDOWN_DEADLINE_SECS`; the sender picks up its own
    /// overrides via [`SenderConfig::from_env`].
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.sender = SenderConfig::from_env();

        if let Some(secs) = std::env::var("PAYOUT_DISPATCH_REFRESH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.refresh_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = std::env::var("PAYOUT_DISPATCH_SHUTDOWN_DEADLINE_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.shutdown_deadline = Duration::from_secs(secs);
        }

        config
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors surfaced to callers of [`Dispatcher::submit`].
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The fleet is empty at admission time.
    #[error("no distributors available")]
    NoDistributorsAvailable,

    /// A queue rejected the batch; the operations were restored to the head
    /// of the pending buffer so a retry re-admits them in order.
    #[error("admission to queue {id} failed: {source}")]
    AdmissionFailed {
        id: DistributorId,
        #[source]
        source: QueueError,
    },
}

/// State guarded by the admission mutex.
struct AdmissionState {
    queues: HashMap<DistributorId, DistributorQueue>,
    pending: VecDeque<Operation>,
}

/// Routes operation streams across the distributor fleet.
pub struct Dispatcher<G, S, R> {
    settings: Arc<S>,
    registry: Arc<R>,
    sender: Arc<BatchSender<G, S>>,
    state: Mutex<AdmissionState>,
    issuers: RwLock<Vec<Issuer>>,
    shutdown: CancellationToken,
    config: DispatcherConfig,
}

impl<G, S, R> Dispatcher<G, S, R>
where
    G: BlockchainGateway + 'static,
    S: SettingsStore + 'static,
    R: DistributorRegistry + 'static,
{
    /// Creates a dispatcher with an empty fleet.
    ///
    /// Call [`Dispatcher::refresh`] (or spawn the refresh task, whose first
    /// tick fires immediately) to populate the queues from the registry.
    pub fn new(
        gateway: Arc<G>,
        settings: Arc<S>,
        registry: Arc<R>,
        config: DispatcherConfig,
    ) -> Self {
        let sender = Arc::new(BatchSender::new(
            gateway,
            settings.clone(),
            config.sender.clone(),
        ));

        Dispatcher {
            settings,
            registry,
            sender,
            state: Mutex::new(AdmissionState {
                queues: HashMap::new(),
                pending: VecDeque::new(),
            }),
            issuers: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Submits operations for distribution.
    ///
    /// Chunks the input into batches of at most
    /// [`crate::types::Batch::MAX_OPS`] operations, admitting each chunk to
    /// the least-loaded queue (ties broken by lowest distributor id).
    /// Returns once the pending buffer is empty or an error occurred.
    #[instrument(skip(self, ops, memo), fields(ops = ops.len(), tag = %tag))]
    pub async fn submit(
        &self,
        ops: Vec<Operation>,
        memo: Option<String>,
        tag: Tag,
    ) -> Result<(), SubmitError> {
        if ops.is_empty() {
            return Ok(());
        }

        // Snapshot the issuer set so a refresh cannot mutate an in-flight
        // batch's refill credentials.
        let issuers = self.issuers.read().await.clone();

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.queues.is_empty() {
            return Err(SubmitError::NoDistributorsAvailable);
        }

        state.pending.extend(ops);

        while !state.pending.is_empty() {
            let take = state.pending.len().min(self.config.sender.max_ops_per_batch);
            let chunk: Vec<Operation> = state.pending.drain(..take).collect();

            let target = state
                .queues
                .values()
                .min_by_key(|q| (q.size(), q.id()))
                .ok_or(SubmitError::NoDistributorsAvailable)?;
            let id = target.id();

            let batch = Batch::new(chunk, memo.clone(), issuers.clone(), tag.clone());
            if let Err(rejected) = target.enqueue(batch) {
                // Restore the chunk at the head so a retry re-admits the
                // operations in their original order.
                for op in rejected.batch.ops.into_iter().rev() {
                    state.pending.push_front(op);
                }
                return Err(SubmitError::AdmissionFailed {
                    id,
                    source: rejected.error,
                });
            }

            debug!(queue = %id, ops = take, "batch admitted");
        }

        Ok(())
    }

    /// Reconciles the queue map against the registry and refreshes the
    /// issuer set from settings.
    ///
    /// Queues for distributors no longer present upstream are shut down and
    /// evicted; new distributors get fresh queues. A malformed credential
    /// skips that distributor with a warning, never failing the refresh.
    #[instrument(skip(self))]
    pub async fn refresh(&self) {
        let issuer = self.settings.issuer_credential().await;
        {
            let mut issuers = self.issuers.write().await;
            *issuers = issuer.into_iter().collect();
        }

        let records = match self.registry.active_distributors().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "distributor refresh failed, keeping current fleet");
                return;
            }
        };

        let upstream: HashMap<DistributorId, DistributorRecord> = records
            .into_iter()
            .filter(|r| r.active)
            .map(|r| (r.id, r))
            .collect();

        let mut state = self.state.lock().await;

        let stale: Vec<DistributorId> = state
            .queues
            .keys()
            .filter(|id| !upstream.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(queue) = state.queues.remove(&id) {
                info!(distributor = %id, "distributor retired, closing queue");
                queue.quit();
            }
        }

        for (id, record) in upstream {
            if state.queues.contains_key(&id) {
                continue;
            }
            match Distributor::try_from_record(&record) {
                Ok(distributor) => {
                    info!(distributor = %id, "starting queue for new distributor");
                    let queue = DistributorQueue::spawn(
                        distributor,
                        self.sender.clone(),
                        self.config.queue.clone(),
                        &self.shutdown,
                    );
                    state.queues.insert(id, queue);
                }
                Err(err) => {
                    warn!(
                        distributor = %id,
                        error = %err,
                        "skipping distributor with invalid credential"
                    );
                }
            }
        }
    }

    /// Spawns the periodic refresh task. The first tick fires immediately.
    pub fn spawn_refresh_task(self: Arc<Self>) -> JoinHandle<()> {
        let this = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    _ = interval.tick() => this.refresh().await,
                }
            }
            info!("refresh task stopped");
        })
    }

    /// Shuts down the fleet: every queue stops accepting work, workers get
    /// the configured grace period, and undrained batches are discarded with
    /// a logged count.
    pub async fn shutdown(&self) {
        info!("dispatcher shutting down");
        self.shutdown.cancel();

        let queues: Vec<DistributorQueue> = {
            let mut state = self.state.lock().await;
            state.queues.drain().map(|(_, q)| q).collect()
        };

        for queue in queues {
            queue.shutdown(self.config.shutdown_deadline).await;
        }
    }

    /// Returns the shutdown token, for wiring into a host process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of live queues.
    pub async fn queue_count(&self) -> usize {
        self.state.lock().await.queues.len()
    }

    /// Depth of a specific queue, if it exists.
    pub async fn queue_size(&self, id: DistributorId) -> Option<usize> {
        self.state.lock().await.queues.get(&id).map(|q| q.size())
    }

    /// Operations stranded in the pending buffer by a failed admission.
    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
