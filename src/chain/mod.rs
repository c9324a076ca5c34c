pub mod address;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use bitcoin::{OutPoint, Script, Transaction, Txid};
use tokio::sync::mpsc;

use self::address::AddressCodec;

/// Notification of a chain event source.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    Block {
        height: u32,
    },
    Transaction {
        transaction: Arc<Transaction>,
        confirmed: bool,
    },
}

/// A transaction as seen by the node, with its current confirmation depth.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub transaction: Transaction,
    pub confirmations: u32,
}

impl TransactionInfo {
    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }
}

/// Node of one UTXO chain. Fetching blocks and transactions from the node is
/// up to the implementation; this crate only consumes what it emits.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn symbol(&self) -> &str;

    /// Stream of `block` and `transaction` notifications, narrowed by the
    /// registered filters. The channel is bounded and lossless: while it is
    /// full the client waits for the subscriber instead of dropping events.
    fn subscribe(&self) -> mpsc::Receiver<ChainEvent>;

    /// Fee rate estimation in satoshis per virtual byte.
    async fn estimate_fee(&self) -> Result<u64>;

    /// `Ok(None)` when the node knows nothing about the transaction: neither
    /// in its mempool nor in the chain.
    async fn raw_transaction(&self, txid: &Txid) -> Result<Option<TransactionInfo>>;

    fn remove_output_filter(&self, script: &Script);

    fn remove_input_filter(&self, outpoint: &OutPoint);
}

/// A chain the watchers run on: its client and how addresses are encoded on it.
#[derive(Clone)]
pub struct Currency {
    pub symbol: String,
    pub chain: Arc<dyn ChainClient>,
    pub codec: AddressCodec,
}

impl Currency {
    pub fn new(chain: Arc<dyn ChainClient>, codec: AddressCodec) -> Self {
        Self {
            symbol: chain.symbol().to_string(),
            chain,
            codec,
        }
    }
}

impl std::fmt::Debug for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Currency")
            .field("symbol", &self.symbol)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Absolute fee of `transaction`, looking up the values of its prevouts.
pub async fn transaction_fee(chain: &dyn ChainClient, transaction: &Transaction) -> Result<u64> {
    let mut input_sum: u64 = 0;
    for input in &transaction.input {
        let prevout = input.previous_output;
        let info = chain
            .raw_transaction(&prevout.txid)
            .await
            .with_context(|| format!("get input transaction {}", prevout.txid))?
            .with_context(|| format!("input transaction {} not found", prevout.txid))?;

        let output = usize::try_from(prevout.vout)
            .ok()
            .and_then(|vout| info.transaction.output.get(vout))
            .with_context(|| format!("prevout {prevout} does not exist"))?;

        input_sum = input_sum
            .checked_add(output.value.to_sat())
            .context("input value overflow")?;
    }

    let output_sum = transaction
        .output
        .iter()
        .try_fold(0u64, |sum, output| sum.checked_add(output.value.to_sat()))
        .context("output value overflow")?;

    input_sum
        .checked_sub(output_sum)
        .with_context(|| format!("transaction {} spends more than it has", transaction.compute_txid()))
}
