use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Network, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use swap_watcher::chain::Currency;
use swap_watcher::chain::address::AddressCodec;
use swap_watcher::swap::classifier::TransactionClassifier;
use swap_watcher::swap::events::SwapEvent;
use swap_watcher::swap::expiry::ExpiryWatcher;
use swap_watcher::swap::htlc::{HtlcSpec, pubkey_hash160, sha256_preimage};
use swap_watcher::swap::overpayment::{OverpaymentConfig, OverpaymentProtector};
use swap_watcher::swap::store::SqliteStore;
use swap_watcher::swap::{ChainSwap, ChainSwapData, OrderSide, ReverseSwap, Swap, SwapStatus};
use swap_watcher::zeroconf::ledger::RiskLedger;
use swap_watcher::zeroconf::policy::ZeroConfPolicy;
use tempfile::TempDir;
use tokio::sync::broadcast;

use super::chain::{MockChainClient, RecordingRateProvider};

pub const SYMBOL: &str = "BTC";
pub const PAIR: &str = "BTC/BTC";
pub const NETWORK: Network = Network::Regtest;

pub fn htlc(seed: u8) -> HtlcSpec {
    HtlcSpec {
        payment_hash: sha256_preimage(&[seed; 32]),
        claimer_pubkey_hash160: pubkey_hash160(&[seed.wrapping_add(1); 33]),
        refunder_pubkey_hash160: pubkey_hash160(&[seed.wrapping_add(2); 33]),
        refund_lock_height: 1_000,
    }
}

pub fn lockup_script(spec: &HtlcSpec) -> ScriptBuf {
    spec.p2wsh_address(NETWORK).script_pubkey()
}

pub fn submarine_swap(id: &str, spec: &HtlcSpec) -> Swap {
    Swap {
        id: id.to_string(),
        pair: PAIR.to_string(),
        order_side: OrderSide::Sell,
        status: SwapStatus::InvoiceSet,
        lockup_address: spec.p2wsh_address(NETWORK).to_string(),
        redeem_script_hex: hex::encode(spec.redeem_script().as_bytes()),
        expected_amount: Some(100_000),
        accept_zero_conf: true,
        lockup_transaction_id: None,
        lockup_transaction_vout: None,
        onchain_amount: None,
        timeout_block_height: 1_000,
    }
}

/// Chain swap receiving on `BTC` to `spec` and sending on `L-BTC`.
pub fn chain_swap(id: &str, spec: &HtlcSpec) -> ChainSwap {
    ChainSwap {
        id: id.to_string(),
        pair: "L-BTC/BTC".to_string(),
        order_side: OrderSide::Buy,
        status: SwapStatus::Created,
        accept_zero_conf: true,
        receiving: ChainSwapData {
            symbol: SYMBOL.to_string(),
            lockup_address: spec.p2wsh_address(NETWORK).to_string(),
            redeem_script_hex: Some(hex::encode(spec.redeem_script().as_bytes())),
            expected_amount: Some(100_000),
            amount: None,
            transaction_id: None,
            transaction_vout: None,
            timeout_block_height: 1_000,
        },
        sending: ChainSwapData {
            symbol: "L-BTC".to_string(),
            lockup_address: format!("liquid-lockup-{id}"),
            redeem_script_hex: None,
            expected_amount: None,
            amount: Some(99_000),
            transaction_id: None,
            transaction_vout: None,
            timeout_block_height: 2_000,
        },
    }
}

pub fn reverse_swap(id: &str, spec: &HtlcSpec) -> ReverseSwap {
    ReverseSwap {
        id: id.to_string(),
        pair: PAIR.to_string(),
        order_side: OrderSide::Sell,
        status: SwapStatus::Created,
        lockup_address: spec.p2wsh_address(NETWORK).to_string(),
        onchain_amount: 100_000,
        transaction_id: None,
        transaction_vout: None,
        timeout_block_height: 1_000,
    }
}

pub fn input(previous_output: OutPoint, sequence: Sequence) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence,
        witness: Witness::new(),
    }
}

pub fn transaction(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

pub fn output(script: &Script, value: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey: script.to_owned(),
    }
}

/// Transaction with a single output of `value`; `salt` keeps txids apart.
pub fn funding(value: u64, salt: u32) -> Transaction {
    let script = ScriptBuf::new_p2wsh(&ScriptBuf::from_bytes(salt.to_le_bytes().to_vec()).wscript_hash());
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(salt),
        input: vec![input(OutPoint::null(), Sequence::MAX)],
        output: vec![output(&script, value)],
    }
}

/// Lockup of `value` to `script` spending the first output of `parent`.
pub fn lockup(parent: &Transaction, script: &Script, value: u64, sequence: Sequence) -> Transaction {
    transaction(
        vec![input(OutPoint::new(parent.compute_txid(), 0), sequence)],
        vec![output(script, value)],
    )
}

pub fn store_path(dir: &Path) -> PathBuf {
    dir.join("swaps.sqlite3")
}

/// Every component wired against one store and one mock `BTC` chain.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<Mutex<SqliteStore>>,
    pub chain: Arc<MockChainClient>,
    pub currency: Currency,
    pub rates: Arc<RecordingRateProvider>,
    pub ledger: Arc<RiskLedger>,
    pub policy: Arc<ZeroConfPolicy>,
    pub classifier: Arc<TransactionClassifier>,
    pub expiry: Arc<ExpiryWatcher>,
    pub events: broadcast::Receiver<SwapEvent>,
}

impl Harness {
    pub fn new(max_risk: u64) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        Self::open(dir, max_risk, 25)
    }

    /// Opens on an existing directory, so tests can seed the store first.
    pub fn open(dir: TempDir, max_risk: u64, max_ancestor_depth: usize) -> Result<Self> {
        let store = SqliteStore::open(store_path(dir.path())).context("open sqlite store")?;
        let store = Arc::new(Mutex::new(store));

        let chain = MockChainClient::new(SYMBOL);
        let currency = Currency::new(chain.clone(), AddressCodec::new(NETWORK));
        let rates = Arc::new(RecordingRateProvider::default());
        let (events_tx, events) = broadcast::channel(64);

        let ledger = Arc::new(RiskLedger::open(
            store.clone(),
            rates.clone(),
            events_tx.clone(),
            HashMap::from([(SYMBOL.to_string(), max_risk)]),
            1,
        )?);
        let policy = Arc::new(ZeroConfPolicy::new(ledger.clone(), max_ancestor_depth));
        let classifier = Arc::new(TransactionClassifier::new(
            store.clone(),
            policy.clone(),
            OverpaymentProtector::new(OverpaymentConfig::default()),
            events_tx.clone(),
        ));
        let expiry = Arc::new(ExpiryWatcher::new(store.clone(), events_tx));

        Ok(Self {
            dir,
            store,
            chain,
            currency,
            rates,
            ledger,
            policy,
            classifier,
            expiry,
            events,
        })
    }

    pub fn store(&self) -> std::sync::MutexGuard<'_, SqliteStore> {
        self.store.lock().unwrap()
    }

    /// Events emitted so far, in order.
    pub fn drain_events(&mut self) -> Vec<SwapEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
