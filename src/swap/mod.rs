pub mod classifier;
pub mod errors;
pub mod events;
pub mod expiry;
pub mod htlc;
pub mod overpayment;
pub mod store;

use anyhow::{Context as _, Result};
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Created,
    InvoiceSet,
    TransactionMempool,
    TransactionConfirmed,
    TransactionZeroConfRejected,
    TransactionLockupFailed,
    TransactionServerMempool,
    TransactionServerConfirmed,
    TransactionClaimed,
    TransactionRefunded,
    Expired,
}

impl SwapStatus {
    pub const FINAL: [SwapStatus; 4] = [
        SwapStatus::Expired,
        SwapStatus::TransactionLockupFailed,
        SwapStatus::TransactionClaimed,
        SwapStatus::TransactionRefunded,
    ];

    pub fn is_final(self) -> bool {
        Self::FINAL.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Splits a pair id like `L-BTC/BTC` into base and quote.
pub fn split_pair(pair: &str) -> (&str, &str) {
    match pair.split_once('/') {
        Some((base, quote)) => (base, quote),
        None => (pair, ""),
    }
}

/// Symbol of the chain the on-chain leg of a swap happens on.
pub fn chain_currency(pair: &str, order_side: OrderSide, is_reverse: bool) -> String {
    let (base, quote) = split_pair(pair);
    let symbol = match (is_reverse, order_side) {
        (false, OrderSide::Buy) | (true, OrderSide::Sell) => quote,
        (false, OrderSide::Sell) | (true, OrderSide::Buy) => base,
    };
    symbol.to_string()
}

/// Submarine swap: the user locks coins on chain and gets paid off chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub status: SwapStatus,

    pub lockup_address: String,
    pub redeem_script_hex: String,
    pub expected_amount: Option<u64>,
    pub accept_zero_conf: bool,

    pub lockup_transaction_id: Option<String>,
    pub lockup_transaction_vout: Option<u32>,
    pub onchain_amount: Option<u64>,

    pub timeout_block_height: u32,
}

impl Swap {
    pub fn chain_symbol(&self) -> String {
        chain_currency(&self.pair, self.order_side, false)
    }
}

/// Reverse swap: we lock coins on chain and the user claims them with the preimage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseSwap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub status: SwapStatus,

    pub lockup_address: String,
    pub onchain_amount: u64,
    pub transaction_id: Option<String>,
    pub transaction_vout: Option<u32>,

    pub timeout_block_height: u32,
}

impl ReverseSwap {
    pub fn chain_symbol(&self) -> String {
        chain_currency(&self.pair, self.order_side, true)
    }
}

/// One leg of a chain swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSwapData {
    pub symbol: String,
    pub lockup_address: String,
    pub redeem_script_hex: Option<String>,
    pub expected_amount: Option<u64>,
    pub amount: Option<u64>,
    pub transaction_id: Option<String>,
    pub transaction_vout: Option<u32>,
    pub timeout_block_height: u32,
}

/// Chain swap: the user locks on the receiving chain, we lock on the sending chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSwap {
    pub id: String,
    pub pair: String,
    pub order_side: OrderSide,
    pub status: SwapStatus,
    pub accept_zero_conf: bool,

    pub receiving: ChainSwapData,
    pub sending: ChainSwapData,
}

/// A swap whose lockup is made by the user and watched for by us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "swap", rename_all = "snake_case")]
pub enum LockupSwap {
    Submarine(Swap),
    Chain(ChainSwap),
}

impl LockupSwap {
    pub fn id(&self) -> &str {
        match self {
            LockupSwap::Submarine(swap) => &swap.id,
            LockupSwap::Chain(swap) => &swap.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LockupSwap::Submarine(_) => "Submarine",
            LockupSwap::Chain(_) => "Chain",
        }
    }

    pub fn status(&self) -> SwapStatus {
        match self {
            LockupSwap::Submarine(swap) => swap.status,
            LockupSwap::Chain(swap) => swap.status,
        }
    }

    pub fn set_status(&mut self, status: SwapStatus) {
        match self {
            LockupSwap::Submarine(swap) => swap.status = status,
            LockupSwap::Chain(swap) => swap.status = status,
        }
    }

    pub fn chain_symbol(&self) -> String {
        match self {
            LockupSwap::Submarine(swap) => swap.chain_symbol(),
            LockupSwap::Chain(swap) => swap.receiving.symbol.clone(),
        }
    }

    pub fn accept_zero_conf(&self) -> bool {
        match self {
            LockupSwap::Submarine(swap) => swap.accept_zero_conf,
            LockupSwap::Chain(swap) => swap.accept_zero_conf,
        }
    }

    pub fn expected_amount(&self) -> Option<u64> {
        match self {
            LockupSwap::Submarine(swap) => swap.expected_amount,
            LockupSwap::Chain(swap) => swap.receiving.expected_amount,
        }
    }

    /// Amount the user locked up for us; what counts against the zero-conf risk.
    pub fn receiving_amount(&self) -> Option<u64> {
        match self {
            LockupSwap::Submarine(swap) => swap.onchain_amount,
            LockupSwap::Chain(swap) => swap.receiving.amount,
        }
    }

    pub fn set_receiving_amount(&mut self, amount: u64) {
        match self {
            LockupSwap::Submarine(swap) => swap.onchain_amount = Some(amount),
            LockupSwap::Chain(swap) => swap.receiving.amount = Some(amount),
        }
    }

    pub fn lockup_address(&self) -> &str {
        match self {
            LockupSwap::Submarine(swap) => &swap.lockup_address,
            LockupSwap::Chain(swap) => &swap.receiving.lockup_address,
        }
    }

    pub fn lockup_transaction_id(&self) -> Option<&str> {
        match self {
            LockupSwap::Submarine(swap) => swap.lockup_transaction_id.as_deref(),
            LockupSwap::Chain(swap) => swap.receiving.transaction_id.as_deref(),
        }
    }

    pub fn redeem_script(&self) -> Result<ScriptBuf> {
        let script_hex = match self {
            LockupSwap::Submarine(swap) => Some(swap.redeem_script_hex.as_str()),
            LockupSwap::Chain(swap) => swap.receiving.redeem_script_hex.as_deref(),
        }
        .with_context(|| format!("{} swap {} has no redeem script", self.kind(), self.id()))?;

        let bytes = hex::decode(script_hex)
            .with_context(|| format!("decode redeem script of swap {}", self.id()))?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

/// A swap whose lockup is made by us and claimed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "swap", rename_all = "snake_case")]
pub enum ServerLockupSwap {
    Reverse(ReverseSwap),
    Chain(ChainSwap),
}

impl ServerLockupSwap {
    pub fn id(&self) -> &str {
        match self {
            ServerLockupSwap::Reverse(swap) => &swap.id,
            ServerLockupSwap::Chain(swap) => &swap.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerLockupSwap::Reverse(_) => "Reverse",
            ServerLockupSwap::Chain(_) => "Chain",
        }
    }

    pub fn status(&self) -> SwapStatus {
        match self {
            ServerLockupSwap::Reverse(swap) => swap.status,
            ServerLockupSwap::Chain(swap) => swap.status,
        }
    }

    pub fn set_status(&mut self, status: SwapStatus) {
        match self {
            ServerLockupSwap::Reverse(swap) => swap.status = status,
            ServerLockupSwap::Chain(swap) => swap.status = status,
        }
    }

    pub fn chain_symbol(&self) -> String {
        match self {
            ServerLockupSwap::Reverse(swap) => swap.chain_symbol(),
            ServerLockupSwap::Chain(swap) => swap.sending.symbol.clone(),
        }
    }

    pub fn lockup_address(&self) -> &str {
        match self {
            ServerLockupSwap::Reverse(swap) => &swap.lockup_address,
            ServerLockupSwap::Chain(swap) => &swap.sending.lockup_address,
        }
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            ServerLockupSwap::Reverse(swap) => swap.transaction_id.as_deref(),
            ServerLockupSwap::Chain(swap) => swap.sending.transaction_id.as_deref(),
        }
    }

    /// Status the swap moves to once our lockup confirmed.
    pub fn confirmed_status(&self) -> SwapStatus {
        match self {
            ServerLockupSwap::Reverse(_) => SwapStatus::TransactionConfirmed,
            ServerLockupSwap::Chain(_) => SwapStatus::TransactionServerConfirmed,
        }
    }
}
