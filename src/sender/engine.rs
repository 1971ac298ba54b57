//! The central submission loop.
//!
//! `BatchSender::send` drives a working set of operations to completion
//! against the gateway: it slices bounded batches, submits them atomically,
//! classifies failures, executes recovery side effects, and requeues or
//! drops operations until the working set is empty or a retry budget runs
//! out.
//!
//! # Loop invariants
//!
//! - The in-flight slice is always a contiguous prefix of the working set;
//!   every removal updates both in one step, so index bookkeeping cannot
//!   drift.
//! - The working set strictly shrinks across outer iterations: a successful
//!   submission removes the whole slice, a partial failure removes at least
//!   one operation or consumes a bounded budget, and the sticky requeue flag
//!   lets any operation reach the tail at most once.
//! - On error return, the working set holds exactly the operations that were
//!   never submitted, so the caller can retry without double-sending.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::gateway::{BlockchainGateway, GatewayError, SettingsStore};
use crate::types::{Distributor, Issuer, Operation, Tag, TxHash};

use super::classify::{classify, RecoveryPlan, TxAction};
use super::recovery::RecoveryActuator;
use super::SenderConfig;

/// Errors surfaced by [`BatchSender::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The transient retry budget ran out with no progress.
    #[error("transient retry budget exhausted after {attempts} attempts")]
    TransientRetriesExhausted { attempts: u32 },

    /// The gateway rejected the submission in a way retries cannot fix.
    #[error("fatal gateway failure: {0}")]
    Fatal(GatewayError),

    /// Shutdown was requested while the submission was in flight.
    #[error("interrupted by shutdown")]
    Cancelled,
}

/// What the failure handler decided about the current slice.
enum Flow {
    /// Retry the (possibly shrunk) slice.
    Continue,

    /// The slice shrank to nothing; move on to the next one.
    SliceDone,

    /// Give up on the slice and drop it from the working set.
    DropSlice,
}

/// Result of applying a per-operation recovery plan.
struct PlanOutcome {
    /// Operations removed from the in-flight prefix.
    removed: usize,

    /// True when every failure was corrected in place and the same slice
    /// should be retried as-is.
    corrected: bool,
}

/// Submits operation batches with error-driven recovery.
pub struct BatchSender<G, S> {
    gateway: Arc<G>,
    settings: Arc<S>,
    actuator: RecoveryActuator<G, S>,
    config: SenderConfig,
}

impl<G, S> BatchSender<G, S>
where
    G: BlockchainGateway,
    S: SettingsStore,
{
    pub fn new(gateway: Arc<G>, settings: Arc<S>, config: SenderConfig) -> Self {
        let actuator = RecoveryActuator::new(gateway.clone(), settings.clone(), config.clone());
        BatchSender {
            gateway,
            settings,
            actuator,
            config,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Drives `remaining` to completion.
    ///
    /// Returns `Ok` when every operation either landed on chain, landed as a
    /// deferred claim, or was individually ruled invalid. Returns an error
    /// only when the transport budget ran out with no progress, the gateway
    /// failed fatally, or shutdown interrupted the loop; in those cases
    /// `remaining` still holds every operation that was never submitted.
    #[instrument(
        skip(self, remaining, issuers, cancel),
        fields(distributor = %distributor.id, tag = %tag, ops = remaining.len())
    )]
    pub async fn send(
        &self,
        distributor: &Distributor,
        remaining: &mut Vec<Operation>,
        memo: Option<&str>,
        issuers: &[Issuer],
        tag: &Tag,
        cancel: &CancellationToken,
    ) -> Result<(), SendError> {
        // Largest first: oversize operations surface at the head where they
        // are isolated early, and the rest packs into dense batches.
        remaining.sort_by(|a, b| b.amount.cmp(&a.amount));

        'outer: while !remaining.is_empty() {
            let mut current_len = remaining.len().min(self.config.max_ops_per_batch);
            let mut transient_retries: u32 = 0;
            let mut op_retries: u32 = 0;

            loop {
                self.gate_on_kill_switch(cancel).await?;

                // Isolate an oversize operation: submit it alone with the
                // amount clamped just below the limit.
                if let Some(pos) = remaining[..current_len]
                    .iter()
                    .position(|op| op.amount >= self.config.hard_amount_limit)
                {
                    let mut clamped = remaining[pos].clone();
                    clamped.amount = self.config.hard_amount_limit - Decimal::ONE;
                    warn!(
                        destination = %clamped.destination,
                        original = %remaining[pos].amount,
                        clamped = %clamped.amount,
                        "oversize operation split into single submission"
                    );

                    match self
                        .submit(distributor, std::slice::from_ref(&clamped), memo)
                        .await
                    {
                        Ok(hash) => {
                            info!(tx = %hash.short(), "oversize operation submitted");
                            remaining.remove(pos);
                            current_len -= 1;
                            if current_len == 0 {
                                continue 'outer;
                            }
                            continue;
                        }
                        Err(err) => {
                            match self
                                .handle_failure(
                                    err,
                                    distributor,
                                    issuers,
                                    tag,
                                    remaining,
                                    &[pos],
                                    &mut current_len,
                                    &mut transient_retries,
                                    &mut op_retries,
                                    cancel,
                                )
                                .await?
                            {
                                Flow::Continue => continue,
                                Flow::SliceDone => continue 'outer,
                                Flow::DropSlice => {
                                    remaining.drain(..current_len);
                                    continue 'outer;
                                }
                            }
                        }
                    }
                }

                match self
                    .submit(distributor, &remaining[..current_len], memo)
                    .await
                {
                    Ok(hash) => {
                        info!(ops = current_len, tx = %hash.short(), "batch submitted");
                        remaining.drain(..current_len);
                        continue 'outer;
                    }
                    Err(err) => {
                        let positions: Vec<usize> = (0..current_len).collect();
                        match self
                            .handle_failure(
                                err,
                                distributor,
                                issuers,
                                tag,
                                remaining,
                                &positions,
                                &mut current_len,
                                &mut transient_retries,
                                &mut op_retries,
                                cancel,
                            )
                            .await?
                        {
                            Flow::Continue => continue,
                            Flow::SliceDone => continue 'outer,
                            Flow::DropSlice => {
                                remaining.drain(..current_len);
                                continue 'outer;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Submits a slice through the gateway under the per-request deadline.
    async fn submit(
        &self,
        distributor: &Distributor,
        ops: &[Operation],
        memo: Option<&str>,
    ) -> Result<TxHash, GatewayError> {
        debug_assert!(!ops.is_empty() && ops.len() <= self.config.max_ops_per_batch);
        match tokio::time::timeout(
            self.config.request_timeout,
            self.gateway.send_many(distributor, ops, memo),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Classifies a failure and acts on the plan.
    ///
    /// `positions` maps plan index `i` to the operation's position in
    /// `remaining`; every position lies inside the in-flight prefix.
    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(
        &self,
        err: GatewayError,
        distributor: &Distributor,
        issuers: &[Issuer],
        tag: &Tag,
        remaining: &mut Vec<Operation>,
        positions: &[usize],
        current_len: &mut usize,
        transient_retries: &mut u32,
        op_retries: &mut u32,
        cancel: &CancellationToken,
    ) -> Result<Flow, SendError> {
        let plan = classify(&err);

        match plan.tx_action {
            TxAction::TransientRetry => {
                *transient_retries += 1;
                if plan.refill_gas {
                    self.actuator.refill_gas(distributor).await;
                }
                let delay = self
                    .config
                    .transient_backoff
                    .delay_for_attempt(*transient_retries - 1);
                warn!(
                    error = %err,
                    attempt = *transient_retries,
                    delay_secs = delay.as_secs(),
                    "transient gateway failure, backing off"
                );
                self.sleep(delay, cancel).await?;
                if *transient_retries >= self.config.transient_backoff.max_retries {
                    return Err(SendError::TransientRetriesExhausted {
                        attempts: *transient_retries,
                    });
                }
                Ok(Flow::Continue)
            }

            TxAction::Fatal => {
                error!(error = %err, "fatal gateway failure");
                Err(SendError::Fatal(err))
            }

            TxAction::None => {
                let outcome = self
                    .apply_plan(&plan, distributor, issuers, tag, remaining, positions)
                    .await;

                if outcome.corrected {
                    *op_retries += 1;
                    if *op_retries >= self.config.max_op_retries {
                        warn!(
                            dropped = *current_len,
                            "op-retry budget exhausted, dropping in-flight slice"
                        );
                        return Ok(Flow::DropSlice);
                    }
                    self.sleep(self.config.op_retry_delay, cancel).await?;
                    return Ok(Flow::Continue);
                }

                *current_len -= outcome.removed;
                *op_retries = 0;
                if *current_len == 0 {
                    return Ok(Flow::SliceDone);
                }
                Ok(Flow::Continue)
            }
        }
    }

    /// Executes a per-operation recovery plan against the working set.
    ///
    /// Actuator failures are merged into the removal sets: a failed trust
    /// line rules the operation invalid, a failed refill moves it to the
    /// tail (or rules it invalid if it was already moved once).
    async fn apply_plan(
        &self,
        plan: &RecoveryPlan,
        distributor: &Distributor,
        issuers: &[Issuer],
        tag: &Tag,
        remaining: &mut Vec<Operation>,
        positions: &[usize],
    ) -> PlanOutcome {
        // A plan index beyond the submitted slice indicates a gateway bug.
        let in_range = |i: &&usize| **i < positions.len();

        let mut invalid: Vec<usize> = plan
            .invalid
            .iter()
            .filter(in_range)
            .copied()
            .collect();
        let mut move_to_end: Vec<usize> = Vec::new();

        for &i in plan.establish_trust.iter().filter(in_range) {
            let asset = remaining[positions[i]].asset.clone();
            if !self.actuator.establish_trust(distributor, &asset).await {
                invalid.push(i);
            }
        }

        for &i in plan.refill_asset.iter().filter(in_range) {
            let asset = remaining[positions[i]].asset.clone();
            if !self.actuator.refill_asset(distributor, &asset, issuers).await {
                move_to_end.push(i);
            }
        }

        for &i in plan.convert_to_claim.iter().filter(in_range) {
            remaining[positions[i]].convert_to_deferred_claim();
            debug!(
                %tag,
                destination = %remaining[positions[i]].destination,
                "operation converted to deferred claim"
            );
        }

        // Sticky requeue flag: an operation already moved once is ruled
        // invalid instead of circulating forever.
        let mut requeue: Vec<usize> = Vec::new();
        for &i in &move_to_end {
            if remaining[positions[i]].moved_to_end() {
                invalid.push(i);
            } else {
                requeue.push(i);
            }
        }

        if invalid.is_empty() && requeue.is_empty() {
            return PlanOutcome {
                removed: 0,
                corrected: true,
            };
        }

        // Remove in descending position order so earlier indices stay valid.
        // Requeued operations go to the tail with the flag set.
        let mut removals: Vec<(usize, bool)> = invalid
            .iter()
            .map(|&i| (positions[i], false))
            .chain(requeue.iter().map(|&i| (positions[i], true)))
            .collect();
        removals.sort_unstable_by_key(|&(pos, _)| pos);
        removals.dedup_by_key(|entry| entry.0);

        let mut requeued_ops = Vec::new();
        for &(pos, is_requeue) in removals.iter().rev() {
            let mut op = remaining.remove(pos);
            if is_requeue {
                op.mark_moved_to_end();
                debug!(
                    %tag,
                    destination = %op.destination,
                    "operation moved to end of working set"
                );
                requeued_ops.push(op);
            } else {
                warn!(
                    %tag,
                    destination = %op.destination,
                    asset = %op.asset,
                    amount = %op.amount,
                    "operation ruled invalid, dropped"
                );
            }
        }
        requeued_ops.reverse();
        let removed = removals.len();
        remaining.extend(requeued_ops);

        PlanOutcome {
            removed,
            corrected: false,
        }
    }

    /// Blocks while the admin kill switch is off, re-polling periodically.
    /// Waiting does not consume any retry budget.
    async fn gate_on_kill_switch(&self, cancel: &CancellationToken) -> Result<(), SendError> {
        while !self.settings.sending_enabled().await {
            info!(
                poll_secs = self.config.stop_sending_poll.as_secs(),
                "sending disabled by admin, waiting"
            );
            self.sleep(self.config.stop_sending_poll, cancel).await?;
        }
        Ok(())
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), SendError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SendError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
