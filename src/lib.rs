//! Payout Dispatch - a multi-distributor transaction dispatcher for batched
//! token payouts.
//!
//! This library accepts streams of token-transfer operations, spreads them
//! across a fleet of sending wallets each bound to its own serial queue,
//! batches them into bounded groups for atomic submission, and recovers from
//! gateway failures adaptively: refilling funds, establishing trust lines,
//! converting unroutable transfers into deferred claims, requeueing, and
//! failing fast on hopeless items.
//!
//! The blockchain transport, settings store, and distributor registry are
//! consumed as capabilities (see [`gateway`]); the library owns no wire
//! format or persistent state.

#[cfg(test)]
pub mod test_utils;

pub mod dispatch;
pub mod gateway;
pub mod queue;
pub mod sender;
pub mod types;
