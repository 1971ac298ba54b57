//! Shared test utilities: fixtures, arbitrary generators, and scripted mock
//! capabilities.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use proptest::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::gateway::{
    BlockchainGateway, DistributorRegistry, GatewayError, SettingsStore,
};
use crate::types::{
    Address, Asset, AssetCode, Distributor, DistributorId, DistributorRecord, Issuer, Operation,
    SigningKey, Tag, TxHash,
};

/// Installs a test subscriber so `RUST_LOG` surfaces dispatcher traces.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "payout_dispatch=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

/// Deterministic valid address, unique per `n`.
pub fn fixture_address(n: u64) -> Address {
    let c = (b'A' + (n % 26) as u8) as char;
    let d = (b'A' + ((n / 26) % 26) as u8) as char;
    let mut s = String::with_capacity(56);
    s.push('G');
    s.push(d);
    for _ in 0..54 {
        s.push(c);
    }
    Address::parse(s).unwrap()
}

/// Deterministic valid signing key, unique per `n`.
pub fn fixture_signing_key(n: u64) -> SigningKey {
    let c = (b'A' + (n % 26) as u8) as char;
    let d = (b'A' + ((n / 26) % 26) as u8) as char;
    let mut s = String::with_capacity(56);
    s.push('S');
    s.push(d);
    for _ in 0..54 {
        s.push(c);
    }
    SigningKey::parse(s).unwrap()
}

/// Issuer credential whose address matches `fixture_asset(n)`'s issuer.
pub fn fixture_issuer(n: u64) -> Issuer {
    Issuer::new(fixture_address(n), fixture_signing_key(n))
}

/// Issued asset whose issuing account is `fixture_address(n)`.
pub fn fixture_asset(n: u64) -> Asset {
    Asset::Issued {
        code: AssetCode::parse(format!("TOK{}", n % 10)).unwrap(),
        issuer: fixture_address(n),
    }
}

/// Decoded distributor with id `n`.
pub fn fixture_distributor(n: u32) -> Distributor {
    Distributor {
        id: DistributorId(n),
        address: fixture_address(u64::from(n)),
        key: fixture_signing_key(u64::from(n)),
    }
}

/// Valid registry record with id `n`.
pub fn fixture_record(n: u32) -> DistributorRecord {
    DistributorRecord {
        id: DistributorId(n),
        address: fixture_address(u64::from(n)).as_str().to_string(),
        seed: fixture_signing_key(u64::from(n)).expose().to_string(),
        active: true,
    }
}

/// Issued-asset operation to a fixed destination.
pub fn fixture_operation(amount: u64) -> Operation {
    Operation::new(fixture_address(10), fixture_asset(2), Decimal::from(amount))
}

/// Deterministic transaction hash, unique per `n`.
pub fn fixture_tx_hash(n: u64) -> TxHash {
    TxHash::parse(format!("{:064x}", n)).unwrap()
}

// ─── Arbitrary generators ─────────────────────────────────────────────────────

pub fn arb_address() -> impl Strategy<Value = Address> {
    "G[A-Z2-7]{55}".prop_map(|s| Address::parse(s).unwrap())
}

pub fn arb_signing_key() -> impl Strategy<Value = SigningKey> {
    "S[A-Z2-7]{55}".prop_map(|s| SigningKey::parse(s).unwrap())
}

pub fn arb_asset_code() -> impl Strategy<Value = AssetCode> {
    "[A-Z0-9]{1,12}".prop_map(|s| AssetCode::parse(s).unwrap())
}

pub fn arb_asset() -> impl Strategy<Value = Asset> {
    prop_oneof![
        Just(Asset::Native),
        (arb_asset_code(), arb_address()).prop_map(|(code, issuer)| Asset::Issued { code, issuer }),
    ]
}

pub fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0u64..1_000_000_000).prop_map(Decimal::from)
}

pub fn arb_operation() -> impl Strategy<Value = Operation> {
    (arb_address(), arb_asset(), arb_amount(), any::<bool>()).prop_map(
        |(destination, asset, amount, deferred)| {
            let mut op = Operation::new(destination, asset, amount);
            if deferred {
                op.convert_to_deferred_claim();
            }
            op
        },
    )
}

pub fn arb_tag() -> impl Strategy<Value = Tag> {
    "[a-z0-9-]{1,20}".prop_map(Tag::new)
}

// ─── Mock gateway ─────────────────────────────────────────────────────────────

/// Scripted gateway: queued results are popped per call; an empty script
/// yields success with a generated hash.
#[derive(Default)]
pub struct MockGateway {
    send_many_script: Mutex<VecDeque<Result<TxHash, GatewayError>>>,
    send_many_default_error: Mutex<Option<GatewayError>>,
    send_many_calls: Mutex<Vec<Vec<Operation>>>,
    send_one_calls: Mutex<Vec<(Address, Decimal)>>,
    trust_script: Mutex<VecDeque<Result<(), GatewayError>>>,
    trust_calls: Mutex<Vec<Asset>>,
    mint_calls: Mutex<Vec<(AssetCode, Decimal, Address)>>,
    balances: Mutex<HashMap<(String, String), Decimal>>,
    hash_counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_send_many(
        &self,
        results: impl IntoIterator<Item = Result<TxHash, GatewayError>>,
    ) {
        self.send_many_script.lock().unwrap().extend(results);
    }

    /// Every unscripted `send_many` call fails with this error.
    pub fn always_fail_send_many(&self, error: GatewayError) {
        *self.send_many_default_error.lock().unwrap() = Some(error);
    }

    pub fn script_trust_results(
        &self,
        results: impl IntoIterator<Item = Result<(), GatewayError>>,
    ) {
        self.trust_script.lock().unwrap().extend(results);
    }

    pub fn set_balance(&self, address: &Address, asset: &Asset, balance: Decimal) {
        self.balances.lock().unwrap().insert(
            (address.as_str().to_string(), asset.to_string()),
            balance,
        );
    }

    /// Snapshots of every `send_many` call's operations.
    pub fn send_many_calls(&self) -> Vec<Vec<Operation>> {
        self.send_many_calls.lock().unwrap().clone()
    }

    /// Recorded `(destination, amount)` pairs from `send_one`.
    pub fn send_one_calls(&self) -> Vec<(Address, Decimal)> {
        self.send_one_calls.lock().unwrap().clone()
    }

    pub fn trust_calls(&self) -> Vec<Asset> {
        self.trust_calls.lock().unwrap().clone()
    }

    /// Recorded `(code, amount, destination)` triples from
    /// `mint_and_transfer`.
    pub fn mint_calls(&self) -> Vec<(AssetCode, Decimal, Address)> {
        self.mint_calls.lock().unwrap().clone()
    }

    fn next_hash(&self) -> TxHash {
        let n = self.hash_counter.fetch_add(1, Ordering::SeqCst);
        fixture_tx_hash(0xFFFF_0000 + n)
    }
}

impl BlockchainGateway for MockGateway {
    async fn send_many(
        &self,
        _distributor: &Distributor,
        ops: &[Operation],
        _memo: Option<&str>,
    ) -> Result<TxHash, GatewayError> {
        self.send_many_calls.lock().unwrap().push(ops.to_vec());
        if let Some(result) = self.send_many_script.lock().unwrap().pop_front() {
            return result;
        }
        if let Some(error) = self.send_many_default_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.next_hash())
    }

    async fn send_one(
        &self,
        _from: &SigningKey,
        amount: Decimal,
        _asset: &Asset,
        to: &Address,
    ) -> Result<TxHash, GatewayError> {
        self.send_one_calls.lock().unwrap().push((to.clone(), amount));
        Ok(self.next_hash())
    }

    async fn establish_trust(
        &self,
        _distributor: &Distributor,
        asset: &Asset,
    ) -> Result<(), GatewayError> {
        self.trust_calls.lock().unwrap().push(asset.clone());
        match self.trust_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(()),
        }
    }

    async fn mint_and_transfer(
        &self,
        code: &AssetCode,
        amount: Decimal,
        _issuer: &SigningKey,
        to: &Address,
    ) -> Result<(), GatewayError> {
        self.mint_calls
            .lock()
            .unwrap()
            .push((code.clone(), amount, to.clone()));
        Ok(())
    }

    async fn balance_of(&self, address: &Address, asset: &Asset) -> Result<Decimal, GatewayError> {
        let key = (address.as_str().to_string(), asset.to_string());
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

// ─── Mock settings ────────────────────────────────────────────────────────────

pub struct MockSettings {
    sending_enabled: AtomicBool,
    issuer: Mutex<Option<Issuer>>,
    refill: Mutex<Option<Issuer>>,
}

impl MockSettings {
    pub fn new() -> Self {
        MockSettings {
            sending_enabled: AtomicBool::new(true),
            issuer: Mutex::new(None),
            refill: Mutex::new(None),
        }
    }

    pub fn set_sending_enabled(&self, enabled: bool) {
        self.sending_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_issuer_credential(&self, issuer: Option<Issuer>) {
        *self.issuer.lock().unwrap() = issuer;
    }

    pub fn set_refill_credential(&self, refill: Option<Issuer>) {
        *self.refill.lock().unwrap() = refill;
    }
}

impl Default for MockSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MockSettings {
    async fn sending_enabled(&self) -> bool {
        self.sending_enabled.load(Ordering::SeqCst)
    }

    async fn issuer_credential(&self) -> Option<Issuer> {
        self.issuer.lock().unwrap().clone()
    }

    async fn refill_credential(&self) -> Option<Issuer> {
        self.refill.lock().unwrap().clone()
    }
}

// ─── Mock registry ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("registry unavailable")]
pub struct RegistryUnavailable;

pub struct MockRegistry {
    records: Mutex<Vec<DistributorRecord>>,
    failing: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Self {
        MockRegistry {
            records: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_records(&self, records: Vec<DistributorRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributorRegistry for MockRegistry {
    type Error = RegistryUnavailable;

    async fn active_distributors(&self) -> Result<Vec<DistributorRecord>, RegistryUnavailable> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryUnavailable);
        }
        Ok(self.records.lock().unwrap().clone())
    }
}
