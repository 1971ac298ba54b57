//! Batch submission and error-driven recovery.
//!
//! This module is the dispatch core's engine room. It drives batching,
//! classification of gateway failures, and the recovery side effects that
//! turn failures into progress:
//!
//! - [`classify`]: pure mapping from a gateway error to a recovery plan
//! - [`RecoveryActuator`]: executes refills and trust-line creation
//! - [`BatchSender`]: the bounded loop that submits, recovers, and requeues
//!
//! # Module Structure
//!
//! - [`backoff`]: exponential back-off configuration for transient failures
//! - [`classify`]: recovery plans and the classifier
//! - [`recovery`]: recovery side effects
//! - [`engine`]: the central submission loop

pub mod backoff;
pub mod classify;
pub mod engine;
pub mod recovery;

pub use backoff::RetryConfig;
pub use classify::{classify, RecoveryPlan, TxAction};
pub use engine::{BatchSender, SendError};
pub use recovery::RecoveryActuator;

use std::time::Duration;

use rust_decimal::Decimal;

/// Default op-retry budget for a single in-flight slice.
const DEFAULT_MAX_OP_RETRIES: u32 = 5;

/// Default pause between in-place corrected retries (seconds).
const DEFAULT_OP_RETRY_DELAY_SECS: u64 = 1;

/// Default kill-switch re-poll interval (seconds).
const DEFAULT_STOP_SENDING_POLL_SECS: u64 = 60;

/// Default per-request gateway deadline (seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for the batch sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Upper bound on operations per atomic submission.
    pub max_ops_per_batch: usize,

    /// Amounts at or above this limit are split off and submitted singly,
    /// clamped to one unit below the limit.
    pub hard_amount_limit: Decimal,

    /// How many times a slice is retried after in-place corrections before
    /// it is dropped.
    pub max_op_retries: u32,

    /// Back-off for transient transport failures.
    pub transient_backoff: RetryConfig,

    /// Pause before retrying a slice whose failures were corrected in place.
    pub op_retry_delay: Duration,

    /// Re-poll interval while the admin kill switch is off.
    pub stop_sending_poll: Duration,

    /// Per-request gateway deadline; exceeding it counts as transient.
    pub request_timeout: Duration,

    /// Fixed amount of the native asset sent on a gas refill.
    pub gas_refill_amount: Decimal,

    /// Target token stock per distributor; a refill tops the balance up to
    /// this limit.
    pub supply_refill_limit: Decimal,
}

impl SenderConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        SenderConfig {
            max_ops_per_batch: crate::types::Batch::MAX_OPS,
            hard_amount_limit: Decimal::from(900_000_000_000u64),
            max_op_retries: DEFAULT_MAX_OP_RETRIES,
            transient_backoff: RetryConfig::TRANSIENT,
            op_retry_delay: Duration::from_secs(DEFAULT_OP_RETRY_DELAY_SECS),
            stop_sending_poll: Duration::from_secs(DEFAULT_STOP_SENDING_POLL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            gas_refill_amount: Decimal::from(10),
            supply_refill_limit: Decimal::from(10_000),
        }
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads `PAYOUT_DISPATCH_SUPPLY_REFILL_LIMIT` and
    /// `PAYOUT_DISPATCH_REQUEST_TIMEOUT_SECS`. Other values use defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(limit) = std::env::var("PAYOUT_DISPATCH_SUPPLY_REFILL_LIMIT")
            .ok()
            .and_then(|s| s.parse::<Decimal>().ok())
        {
            config.supply_refill_limit = limit;
        }

        if let Some(secs) = std::env::var("PAYOUT_DISPATCH_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self::new()
    }
}
