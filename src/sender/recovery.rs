//! Recovery side effects: gas refills, trust lines, and token refills.
//!
//! The actuator executes the side effects named by a recovery plan. Its
//! contract is that nothing here panics or propagates an error: every
//! failure is logged and surfaced as a `bool` so the sender can reclassify
//! the affected operation and keep the loop bounded.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::gateway::{BlockchainGateway, SettingsStore};
use crate::types::{Asset, Distributor, Issuer};

use super::SenderConfig;

/// Executes recovery side effects against the gateway.
pub struct RecoveryActuator<G, S> {
    gateway: Arc<G>,
    settings: Arc<S>,
    config: SenderConfig,
}

impl<G, S> RecoveryActuator<G, S>
where
    G: BlockchainGateway,
    S: SettingsStore,
{
    pub fn new(gateway: Arc<G>, settings: Arc<S>, config: SenderConfig) -> Self {
        RecoveryActuator {
            gateway,
            settings,
            config,
        }
    }

    /// Tops up the distributor's gas balance from the configured refill
    /// wallet. Best-effort: the caller retries the submission either way.
    pub async fn refill_gas(&self, distributor: &Distributor) -> bool {
        let Some(refill) = self.settings.refill_credential().await else {
            warn!(
                distributor = %distributor.id,
                "gas refill skipped: no refill wallet configured"
            );
            return false;
        };

        match self
            .gateway
            .send_one(
                &refill.key,
                self.config.gas_refill_amount,
                &Asset::Native,
                &distributor.address,
            )
            .await
        {
            Ok(hash) => {
                info!(
                    distributor = %distributor.id,
                    amount = %self.config.gas_refill_amount,
                    tx = %hash.short(),
                    "gas refill submitted"
                );
                true
            }
            Err(err) => {
                warn!(
                    distributor = %distributor.id,
                    error = %err,
                    "gas refill failed"
                );
                false
            }
        }
    }

    /// Creates a source-side trust line for the asset.
    ///
    /// Returns `false` on failure; the caller reclassifies the affected
    /// operation as invalid.
    pub async fn establish_trust(&self, distributor: &Distributor, asset: &Asset) -> bool {
        match self.gateway.establish_trust(distributor, asset).await {
            Ok(()) => {
                info!(distributor = %distributor.id, %asset, "trust line established");
                true
            }
            Err(err) => {
                warn!(
                    distributor = %distributor.id,
                    %asset,
                    error = %err,
                    "trust line creation failed"
                );
                false
            }
        }
    }

    /// Refills the distributor's stock of an issued asset up to the supply
    /// limit.
    ///
    /// Returns `false` when no matching issuer credential is available, when
    /// the balance is already at or above the limit, or when the mint fails;
    /// the caller moves the affected operation to the end of the working set.
    pub async fn refill_asset(
        &self,
        distributor: &Distributor,
        asset: &Asset,
        issuers: &[Issuer],
    ) -> bool {
        let (Some(code), Some(asset_issuer)) = (asset.code(), asset.issuer()) else {
            warn!(distributor = %distributor.id, "refill skipped: native asset cannot be minted");
            return false;
        };

        let Some(issuer) = issuers.iter().find(|i| i.address == *asset_issuer) else {
            warn!(
                distributor = %distributor.id,
                %asset,
                "refill skipped: no credential for issuer"
            );
            return false;
        };

        let balance = match self.gateway.balance_of(&distributor.address, asset).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(
                    distributor = %distributor.id,
                    %asset,
                    error = %err,
                    "refill skipped: balance lookup failed"
                );
                return false;
            }
        };

        let refill = self.config.supply_refill_limit - balance;
        if refill <= Decimal::ZERO {
            debug!(
                distributor = %distributor.id,
                %asset,
                %balance,
                "refill skipped: balance already at supply limit"
            );
            return false;
        }

        match self
            .gateway
            .mint_and_transfer(code, refill, &issuer.key, &distributor.address)
            .await
        {
            Ok(()) => {
                info!(
                    distributor = %distributor.id,
                    %asset,
                    amount = %refill,
                    "asset refill submitted"
                );
                true
            }
            Err(err) => {
                warn!(
                    distributor = %distributor.id,
                    %asset,
                    error = %err,
                    "asset refill failed"
                );
                false
            }
        }
    }
}
