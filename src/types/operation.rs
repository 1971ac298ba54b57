//! Transfer operations and the batch envelopes that carry them.
//!
//! An `Operation` describes one token transfer. A `Batch` groups up to
//! `Batch::MAX_OPS` operations for a single atomic gateway submission,
//! together with the issuer credentials usable for refills and the caller's
//! logging tag.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::ids::{Address, Tag};
use super::keys::Issuer;

/// How a transfer is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// A direct payment into the recipient's balance.
    #[default]
    DirectPayment,

    /// An on-chain artifact holding funds until the recipient claims them.
    ///
    /// Used when the recipient lacks a trust line for the asset.
    DeferredClaim,
}

/// A single token transfer.
///
/// The `moved_to_end` flag is sticky: it is set at most once, when the
/// operation is requeued to the tail of the working set after a failed
/// refill. A second under-funding failure rules the operation invalid
/// instead of requeueing it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub destination: Address,
    pub asset: Asset,
    pub amount: Decimal,
    pub kind: TransferKind,
    moved_to_end: bool,
}

impl Operation {
    /// Creates a direct-payment operation.
    pub fn new(destination: Address, asset: Asset, amount: Decimal) -> Self {
        Operation {
            destination,
            asset,
            amount,
            kind: TransferKind::DirectPayment,
            moved_to_end: false,
        }
    }

    /// Whether this operation has already been requeued once for
    /// under-funding.
    pub fn moved_to_end(&self) -> bool {
        self.moved_to_end
    }

    /// Sets the sticky requeue flag.
    ///
    /// Returns `true` if the flag was newly set, `false` if it was already
    /// set (the flag transitions at most once).
    pub fn mark_moved_to_end(&mut self) -> bool {
        if self.moved_to_end {
            false
        } else {
            self.moved_to_end = true;
            true
        }
    }

    /// Converts this transfer into a deferred claim. Idempotent.
    pub fn convert_to_deferred_claim(&mut self) {
        self.kind = TransferKind::DeferredClaim;
    }

    pub fn is_deferred_claim(&self) -> bool {
        self.kind == TransferKind::DeferredClaim
    }
}

/// An envelope of operations bound for one atomic submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Ordered operations; `1..=MAX_OPS` at the moment of submission.
    pub ops: Vec<Operation>,

    /// Optional short memo attached to the on-chain transaction.
    pub memo: Option<String>,

    /// Issuer credentials usable for refills, snapshotted at admission so a
    /// later registry refresh cannot mutate an in-flight batch.
    pub issuers: Vec<Issuer>,

    /// Caller-supplied logging correlator.
    pub tag: Tag,

    /// How many times this batch has been handed back to its queue.
    pub retry_count: u32,
}

impl Batch {
    /// Upper bound on operations per atomic submission.
    pub const MAX_OPS: usize = 100;

    pub fn new(ops: Vec<Operation>, memo: Option<String>, issuers: Vec<Issuer>, tag: Tag) -> Self {
        debug_assert!(!ops.is_empty() && ops.len() <= Self::MAX_OPS);
        Batch {
            ops,
            memo,
            issuers,
            tag,
            retry_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
