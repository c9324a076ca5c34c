use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use bitcoin::{OutPoint, Script, ScriptBuf, Transaction, Txid};
use swap_watcher::chain::{ChainClient, ChainEvent, TransactionInfo};
use swap_watcher::zeroconf::RateProvider;
use tokio::sync::mpsc;

/// Capacity of every subscription, small enough for tests to fill it.
const SUBSCRIPTION_CAPACITY: usize = 64;

/// In-process chain with a settable view of the node's transactions.
pub struct MockChainClient {
    symbol: String,
    subscribers: Mutex<Vec<mpsc::Sender<ChainEvent>>>,
    state: Mutex<MockState>,
}

struct MockState {
    transactions: HashMap<Txid, TransactionInfo>,
    failing: HashSet<Txid>,
    fee_estimate: u64,
    removed_output_filters: Vec<ScriptBuf>,
    removed_input_filters: Vec<OutPoint>,
}

impl MockChainClient {
    pub fn new(symbol: &str) -> Arc<Self> {
        Arc::new(Self {
            symbol: symbol.to_string(),
            subscribers: Mutex::new(Vec::new()),
            state: Mutex::new(MockState {
                transactions: HashMap::new(),
                failing: HashSet::new(),
                fee_estimate: 2,
                removed_output_filters: Vec::new(),
                removed_input_filters: Vec::new(),
            }),
        })
    }

    pub fn add_transaction(&self, transaction: &Transaction, confirmations: u32) {
        self.state.lock().unwrap().transactions.insert(
            transaction.compute_txid(),
            TransactionInfo {
                transaction: transaction.clone(),
                confirmations,
            },
        );
    }

    pub fn fail_lookups_of(&self, txid: Txid) {
        self.state.lock().unwrap().failing.insert(txid);
    }

    pub fn set_fee_estimate(&self, sat_per_vbyte: u64) {
        self.state.lock().unwrap().fee_estimate = sat_per_vbyte;
    }

    pub fn removed_output_filters(&self) -> Vec<ScriptBuf> {
        self.state.lock().unwrap().removed_output_filters.clone()
    }

    pub fn removed_input_filters(&self) -> Vec<OutPoint> {
        self.state.lock().unwrap().removed_input_filters.clone()
    }

    /// Delivers `event` to every live subscriber, waiting while one is full.
    pub async fn emit(&self, event: ChainEvent) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for subscriber in subscribers {
            let _ = subscriber.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn subscribe(&self) -> mpsc::Receiver<ChainEvent> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscribers.lock().unwrap().push(sender);
        receiver
    }

    async fn estimate_fee(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().fee_estimate)
    }

    async fn raw_transaction(&self, txid: &Txid) -> Result<Option<TransactionInfo>> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(txid) {
            bail!("node unreachable");
        }
        Ok(state.transactions.get(txid).cloned())
    }

    fn remove_output_filter(&self, script: &Script) {
        self.state
            .lock()
            .unwrap()
            .removed_output_filters
            .push(script.to_owned());
    }

    fn remove_input_filter(&self, outpoint: &OutPoint) {
        self.state
            .lock()
            .unwrap()
            .removed_input_filters
            .push(*outpoint);
    }
}

/// Records the ceilings it was given. Failed calls are not recorded.
#[derive(Default)]
pub struct RecordingRateProvider {
    calls: Mutex<Vec<(String, u64)>>,
    fail_next: AtomicBool,
}

impl RecordingRateProvider {
    pub fn calls(&self) -> Vec<(String, u64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RateProvider for RecordingRateProvider {
    async fn set_zero_conf_amount(&self, symbol: &str, amount: u64) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            bail!("rate provider unavailable");
        }
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), amount));
        Ok(())
    }
}
