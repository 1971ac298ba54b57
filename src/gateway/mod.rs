//! External capabilities consumed by the dispatcher core.
//!
//! The core owns no transport: blockchain submission, the admin settings
//! store, and the distributor registry are all injected at construction as
//! trait objects of the capabilities defined here. The trait-based design
//! enables:
//! - Mock implementations for testing
//! - Swapping the real transport (signing, fee handling, HTTP) without
//!   touching the dispatch logic
//!
//! Methods return `impl Future + Send` so implementations can be written as
//! plain `async fn`s and the dispatcher can drive them from spawned tasks.

mod error;

pub use error::{GatewayError, OperationCode, TransactionCode};

use std::future::Future;

use rust_decimal::Decimal;

use crate::types::{
    Address, Asset, AssetCode, Distributor, DistributorRecord, Issuer, Operation, SigningKey,
    TxHash,
};

/// Submits transactions to the blockchain.
///
/// `send_many` is atomic: either every operation in the slice lands on chain
/// or none does. A rejection carries structured result codes (one per
/// operation for batch submissions) that drive the recovery logic.
pub trait BlockchainGateway: Send + Sync {
    /// Submits up to [`crate::types::Batch::MAX_OPS`] operations atomically
    /// from the distributor's wallet.
    fn send_many(
        &self,
        distributor: &Distributor,
        ops: &[Operation],
        memo: Option<&str>,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send;

    /// Submits a single transfer from an arbitrary signing key.
    fn send_one(
        &self,
        from: &SigningKey,
        amount: Decimal,
        asset: &Asset,
        to: &Address,
    ) -> impl Future<Output = Result<TxHash, GatewayError>> + Send;

    /// Creates a trust line from the distributor's wallet to the asset.
    fn establish_trust(
        &self,
        distributor: &Distributor,
        asset: &Asset,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Mints `amount` of the issuer's asset and transfers it to `to`.
    fn mint_and_transfer(
        &self,
        code: &AssetCode,
        amount: Decimal,
        issuer: &SigningKey,
        to: &Address,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Reads an account's balance of the given asset.
    fn balance_of(
        &self,
        address: &Address,
        asset: &Asset,
    ) -> impl Future<Output = Result<Decimal, GatewayError>> + Send;
}

/// Admin-controlled settings polled by the dispatcher.
pub trait SettingsStore: Send + Sync {
    /// The admin kill switch, polled before every batch submission.
    fn sending_enabled(&self) -> impl Future<Output = bool> + Send;

    /// The issuer credential usable for token refills, if configured.
    fn issuer_credential(&self) -> impl Future<Output = Option<Issuer>> + Send;

    /// The wallet used for gas refills, if configured.
    fn refill_credential(&self) -> impl Future<Output = Option<Issuer>> + Send;
}

/// Source of truth for the distributor fleet, polled periodically.
pub trait DistributorRegistry: Send + Sync {
    /// The error type returned by registry reads.
    type Error: std::error::Error + Send;

    /// Returns the current distributor set, including inactive rows.
    fn active_distributors(
        &self,
    ) -> impl Future<Output = Result<Vec<DistributorRecord>, Self::Error>> + Send;
}
