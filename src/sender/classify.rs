//! Pure classification of gateway errors into recovery plans.
//!
//! `classify` is a total, pure function: the same error always yields the
//! same plan, and every possible error maps to something. The plan carries
//! ordered index sets over the in-flight batch; the sender executes the
//! plan's side effects and merges actuator failures into the removal sets.
//!
//! # Mapping
//!
//! | Gateway signal | Scope | Plan |
//! |---|---|---|
//! | transport 5xx / timeout / unparseable | transaction | transient retry |
//! | transport 4xx | transaction | fatal |
//! | `tx_insufficient_balance` | transaction | gas refill, then transient retry |
//! | `op_success` | operation | keep |
//! | `op_no_trust` | operation | convert to deferred claim |
//! | `op_malformed`, `op_line_full` | operation | invalid |
//! | `op_src_no_trust` | operation | establish trust (failure → invalid) |
//! | `op_underfunded` | operation | refill asset (failure → move to end) |
//! | any other operation code | operation | invalid |
//! | code-bearing rejection without op codes | transaction | transient retry |

use crate::gateway::{GatewayError, OperationCode, TransactionCode};

/// Transaction-scope action of a recovery plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxAction {
    /// No transaction-scope action; the per-operation sets apply.
    #[default]
    None,

    /// Retry the same submission after a back-off.
    TransientRetry,

    /// Give up on the submission entirely.
    Fatal,
}

/// A structured recovery plan over the in-flight batch.
///
/// All index sets are ordered and refer to positions in the batch that was
/// submitted. `invalid` and the conversions are final classifications;
/// `establish_trust` and `refill_asset` name side effects whose failures the
/// sender reclassifies (to invalid and move-to-end respectively).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryPlan {
    /// Transaction-scope action. When not `None`, the index sets are empty.
    pub tx_action: TxAction,

    /// Whether to top up the distributor's gas before retrying.
    pub refill_gas: bool,

    /// Operations ruled permanently invalid.
    pub invalid: Vec<usize>,

    /// Operations to convert into deferred claims before the next attempt.
    pub convert_to_claim: Vec<usize>,

    /// Operations whose asset needs a source-side trust line.
    pub establish_trust: Vec<usize>,

    /// Operations whose asset balance needs an issuer refill.
    pub refill_asset: Vec<usize>,
}

impl RecoveryPlan {
    fn transient() -> Self {
        RecoveryPlan {
            tx_action: TxAction::TransientRetry,
            ..Default::default()
        }
    }

    fn fatal() -> Self {
        RecoveryPlan {
            tx_action: TxAction::Fatal,
            ..Default::default()
        }
    }

    /// True when the plan names no per-operation work at all.
    pub fn is_empty(&self) -> bool {
        self.invalid.is_empty()
            && self.convert_to_claim.is_empty()
            && self.establish_trust.is_empty()
            && self.refill_asset.is_empty()
    }
}

/// Maps a gateway error to a recovery plan.
pub fn classify(error: &GatewayError) -> RecoveryPlan {
    match error {
        GatewayError::Transport { status, .. } => {
            if (500..600).contains(status) {
                RecoveryPlan::transient()
            } else {
                RecoveryPlan::fatal()
            }
        }

        // A timed-out or unparseable response may still have landed; the
        // retry is safe because the gateway rejects duplicate sequence
        // numbers.
        GatewayError::Timeout | GatewayError::Malformed { .. } => RecoveryPlan::transient(),

        GatewayError::Transaction {
            transaction_code,
            operation_codes,
        } => {
            if transaction_code == &Some(TransactionCode::InsufficientBalance) {
                let mut plan = RecoveryPlan::transient();
                plan.refill_gas = true;
                return plan;
            }

            let Some(codes) = operation_codes else {
                // No per-operation detail to act on.
                return RecoveryPlan::transient();
            };

            let mut plan = RecoveryPlan::default();
            for (index, code) in codes.iter().enumerate() {
                match code {
                    OperationCode::Success => {}
                    OperationCode::NoTrust => plan.convert_to_claim.push(index),
                    OperationCode::Malformed | OperationCode::LineFull => {
                        plan.invalid.push(index)
                    }
                    OperationCode::SrcNoTrust => plan.establish_trust.push(index),
                    OperationCode::Underfunded => plan.refill_asset.push(index),
                    OperationCode::Other(_) => plan.invalid.push(index),
                }
            }
            plan
        }
    }
}
