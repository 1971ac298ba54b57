//! Core domain types for the payout dispatcher.
//!
//! This module contains the fundamental types used throughout the crate,
//! designed to encode invariants via the type system: validated identifiers,
//! redacted signing material, and the operation/batch data model.

pub mod asset;
pub mod ids;
pub mod keys;
pub mod operation;

// Re-export commonly used types at the module level
pub use asset::{Asset, AssetCode, InvalidAssetCode};
pub use ids::{Address, DistributorId, InvalidAddress, InvalidTxHash, Tag, TxHash};
pub use keys::{
    CredentialError, Distributor, DistributorRecord, InvalidSigningKey, Issuer, SigningKey,
};
pub use operation::{Batch, Operation, TransferKind};
