use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use bitcoin::Txid;
use serde::Serialize;
use tokio::sync::broadcast;

use super::{RateProvider, RiskError};
use crate::chain::Currency;
use crate::swap::LockupSwap;
use crate::swap::events::SwapEvent;
use crate::swap::htlc::detect_swap;
use crate::swap::store::{PendingLockupTransaction, SqliteStore};

/// Per chain bookkeeping of lockups accepted while still unconfirmed.
///
/// Every persisted [`PendingLockupTransaction`] of a tracked chain is counted
/// exactly once in that chain's `current_risk`. Entries are only added by
/// [`RiskLedger::is_acceptable`] and only removed by [`RiskLedger::release`],
/// which is also what [`RiskLedger::reconcile`] goes through.
pub struct RiskLedger {
    store: Arc<Mutex<SqliteStore>>,
    rate_provider: Arc<dyn RateProvider>,
    events: broadcast::Sender<SwapEvent>,
    required_confirmations: u32,
    chains: HashMap<String, ChainRisk>,
}

struct ChainRisk {
    max_risk: u64,
    zero_conf_enabled: AtomicBool,
    /// Set while the rate provider still has to learn the zeroed ceiling.
    zero_ceiling_pending: AtomicBool,
    exposure: tokio::sync::Mutex<Exposure>,
}

#[derive(Debug, Default)]
struct Exposure {
    current_risk: u64,
    pending: HashMap<String, u64>,
}

impl Exposure {
    fn add(&mut self, swap_id: &str, amount: u64) {
        if let Some(previous) = self.pending.insert(swap_id.to_string(), amount) {
            self.current_risk -= previous;
        }
        self.current_risk += amount;
    }

    fn remove(&mut self, swap_id: &str) -> Option<u64> {
        let amount = self.pending.remove(swap_id)?;
        self.current_risk -= amount;
        Some(amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskSnapshot {
    pub symbol: String,
    pub current_risk: u64,
    pub max_risk: u64,
    pub zero_conf_enabled: bool,
    pub pending: usize,
}

/// A persisted pending lockup joined with the swap it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredLockup {
    pub swap_id: String,
    pub chain_symbol: String,
    pub transaction_id: Txid,
    pub amount: u64,
}

#[derive(Debug, Default)]
pub struct Recovery {
    pub lockups: Vec<RecoveredLockup>,
    /// Entries whose swap record does not exist anymore.
    pub stale: Vec<String>,
}

impl Recovery {
    pub fn current_risk(&self, symbol: &str) -> u64 {
        self.lockups
            .iter()
            .filter(|lockup| lockup.chain_symbol == symbol)
            .map(|lockup| lockup.amount)
            .sum()
    }
}

/// Joins the persisted pending lockups with their swaps. Read only; stale
/// entries are reported, not deleted.
pub fn recover_pending_lockups(store: &SqliteStore) -> Result<Recovery> {
    let mut recovery = Recovery::default();

    for entry in store.pending_lockups()? {
        let transaction = entry.transaction()?;
        let Some(swap) = store.lockup_swap(&entry.swap_id)? else {
            recovery.stale.push(entry.swap_id);
            continue;
        };

        let amount = match swap.receiving_amount() {
            Some(amount) => amount,
            None => {
                let redeem_script = swap.redeem_script()?;
                detect_swap(&redeem_script, &transaction)
                    .map(|output| output.value)
                    .with_context(|| {
                        format!(
                            "cannot derive the at risk amount of swap {}: no lockup output in {}",
                            entry.swap_id,
                            transaction.compute_txid()
                        )
                    })?
            }
        };

        recovery.lockups.push(RecoveredLockup {
            swap_id: entry.swap_id,
            chain_symbol: entry.chain_symbol,
            transaction_id: transaction.compute_txid(),
            amount,
        });
    }

    Ok(recovery)
}

impl RiskLedger {
    /// Builds the ledger for the chains in `max_risks` and restores their
    /// exposure from the persisted pending lockups.
    pub fn open(
        store: Arc<Mutex<SqliteStore>>,
        rate_provider: Arc<dyn RateProvider>,
        events: broadcast::Sender<SwapEvent>,
        max_risks: HashMap<String, u64>,
        required_confirmations: u32,
    ) -> Result<Self> {
        let recovery = {
            let mut store = store.lock().expect("store mutex poisoned");
            let recovery = recover_pending_lockups(&store).context("recover pending lockups")?;
            for swap_id in &recovery.stale {
                tracing::info!(swap_id = %swap_id, "dropping pending lockup of unknown swap");
                store.delete_pending_lockup(swap_id)?;
            }
            recovery
        };

        let mut chains: HashMap<String, ChainRisk> = max_risks
            .into_iter()
            .map(|(symbol, max_risk)| {
                (
                    symbol,
                    ChainRisk {
                        max_risk,
                        zero_conf_enabled: AtomicBool::new(true),
                        zero_ceiling_pending: AtomicBool::new(false),
                        exposure: tokio::sync::Mutex::new(Exposure::default()),
                    },
                )
            })
            .collect();

        for lockup in recovery.lockups {
            let Some(chain) = chains.get_mut(&lockup.chain_symbol) else {
                tracing::warn!(
                    swap_id = %lockup.swap_id,
                    symbol = %lockup.chain_symbol,
                    "pending lockup on a chain without risk limit"
                );
                continue;
            };
            chain.exposure.get_mut().add(&lockup.swap_id, lockup.amount);
        }

        for (symbol, chain) in &mut chains {
            let exposure = chain.exposure.get_mut();
            tracing::info!(
                symbol = %symbol,
                current_risk = exposure.current_risk,
                max_risk = chain.max_risk,
                pending = exposure.pending.len(),
                "recovered 0-conf risk"
            );
        }

        Ok(Self {
            store,
            rate_provider,
            events,
            required_confirmations,
            chains,
        })
    }

    fn chain(&self, symbol: &str) -> Result<&ChainRisk, RiskError> {
        self.chains
            .get(symbol)
            .ok_or_else(|| RiskError::SymbolNotTracked(symbol.to_string()))
    }

    /// Admits the unconfirmed lockup of `swap` if its receiving amount still
    /// fits below the chain's maximum risk. Nothing is recorded when it does
    /// not fit.
    pub async fn is_acceptable(&self, swap: &LockupSwap, transaction_hex: &str) -> Result<bool> {
        let symbol = swap.chain_symbol();
        let chain = self.chain(&symbol)?;
        let amount = swap
            .receiving_amount()
            .with_context(|| format!("swap {} has no receiving amount", swap.id()))?;

        let mut exposure = chain.exposure.lock().await;
        let previous = exposure.pending.get(swap.id()).copied().unwrap_or(0);
        let projected = (exposure.current_risk - previous).saturating_add(amount);
        if projected > chain.max_risk {
            tracing::info!(
                swap_id = %swap.id(),
                symbol = %symbol,
                amount,
                current_risk = exposure.current_risk,
                max_risk = chain.max_risk,
                "0-conf risk limit reached"
            );
            return Ok(false);
        }

        let entry = PendingLockupTransaction {
            swap_id: swap.id().to_string(),
            chain_symbol: symbol.clone(),
            transaction_hex: transaction_hex.to_string(),
        };
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert_pending_lockup(&entry)
            .map_err(|err| RiskError::Ledger {
                symbol: symbol.clone(),
                reason: format!("{err:#}"),
            })?;
        exposure.add(swap.id(), amount);

        tracing::debug!(
            swap_id = %swap.id(),
            symbol = %symbol,
            amount,
            current_risk = exposure.current_risk,
            "accepted 0-conf lockup"
        );
        Ok(true)
    }

    /// Drops the pending lockup of `swap_id` and gives its amount back.
    /// `false` if the swap had no pending lockup.
    pub async fn release(&self, swap_id: &str) -> Result<bool> {
        let entry = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .get_pending_lockup(swap_id)?;
        let Some(entry) = entry else {
            return Ok(false);
        };

        let ledger_error = |err: anyhow::Error| RiskError::Ledger {
            symbol: entry.chain_symbol.clone(),
            reason: format!("{err:#}"),
        };

        let Some(chain) = self.chains.get(&entry.chain_symbol) else {
            self.store
                .lock()
                .expect("store mutex poisoned")
                .delete_pending_lockup(swap_id)
                .map_err(ledger_error)?;
            return Ok(true);
        };

        let mut exposure = chain.exposure.lock().await;
        self.store
            .lock()
            .expect("store mutex poisoned")
            .delete_pending_lockup(swap_id)
            .map_err(ledger_error)?;
        let amount = exposure.remove(swap_id);

        tracing::debug!(
            swap_id = %swap_id,
            symbol = %entry.chain_symbol,
            amount = amount.unwrap_or(0),
            current_risk = exposure.current_risk,
            "released 0-conf lockup"
        );
        Ok(true)
    }

    /// Checks every pending lockup of `currency` against the node: confirmed
    /// lockups are released, vanished ones disable 0-conf for the chain.
    pub async fn reconcile(&self, currency: &Currency) -> Result<()> {
        let symbol = currency.symbol.as_str();
        if let Some(chain) = self.chains.get(symbol) {
            self.push_zero_ceiling(symbol, chain).await;
        }

        let entries = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .pending_lockups_for_chain(symbol)?;

        for entry in entries {
            let transaction = entry.transaction().map_err(|err| RiskError::Ledger {
                symbol: symbol.to_string(),
                reason: format!("{err:#}"),
            })?;
            let txid = transaction.compute_txid();

            let swap = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .lockup_swap(&entry.swap_id)?;
            if swap.is_none() {
                tracing::info!(swap_id = %entry.swap_id, "releasing pending lockup of unknown swap");
                self.release(&entry.swap_id).await?;
                continue;
            }

            match currency.chain.raw_transaction(&txid).await {
                Ok(Some(info)) if info.confirmations >= self.required_confirmations => {
                    self.release(&entry.swap_id).await?;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(
                        swap_id = %entry.swap_id,
                        symbol = %symbol,
                        txid = %txid,
                        "accepted 0-conf lockup vanished"
                    );
                    self.disable_zero_conf(symbol).await;
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        swap_id = %entry.swap_id,
                        txid = %txid,
                        "failed to look up pending lockup"
                    );
                }
            }
        }

        Ok(())
    }

    /// Trips the kill switch of `symbol`. Only the first trip notifies.
    async fn disable_zero_conf(&self, symbol: &str) -> bool {
        let Some(chain) = self.chains.get(symbol) else {
            return false;
        };
        if chain
            .zero_conf_enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        tracing::warn!(symbol = %symbol, "disabled 0-conf");
        chain.zero_ceiling_pending.store(true, Ordering::SeqCst);
        let _ = self.events.send(SwapEvent::ZeroConfDisabled {
            symbol: symbol.to_string(),
        });
        self.push_zero_ceiling(symbol, chain).await;
        true
    }

    /// Zeroes the ceiling at the rate provider of a tripped chain. A failed
    /// attempt is repeated on the next reconciliation.
    async fn push_zero_ceiling(&self, symbol: &str, chain: &ChainRisk) {
        if !chain.zero_ceiling_pending.load(Ordering::SeqCst) {
            return;
        }
        match self.rate_provider.set_zero_conf_amount(symbol, 0).await {
            Ok(()) => chain.zero_ceiling_pending.store(false, Ordering::SeqCst),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), symbol = %symbol, "failed to zero the 0-conf amount");
            }
        }
    }

    /// `false` for chains that are not tracked or whose kill switch tripped.
    pub fn zero_conf_accepted(&self, symbol: &str) -> bool {
        self.chains
            .get(symbol)
            .is_some_and(|chain| chain.zero_conf_enabled.load(Ordering::SeqCst))
    }

    /// Manual reset of a tripped kill switch; restores the configured ceiling.
    pub async fn reset_zero_conf(&self, symbol: &str) -> Result<()> {
        let chain = self.chain(symbol)?;
        chain.zero_ceiling_pending.store(false, Ordering::SeqCst);
        self.rate_provider
            .set_zero_conf_amount(symbol, chain.max_risk)
            .await
            .with_context(|| format!("restore 0-conf amount of {symbol}"))?;
        chain.zero_conf_enabled.store(true, Ordering::SeqCst);
        tracing::info!(symbol = %symbol, "re-enabled 0-conf");
        Ok(())
    }

    pub async fn current_risk(&self, symbol: &str) -> Result<u64> {
        Ok(self.chain(symbol)?.exposure.lock().await.current_risk)
    }

    pub async fn risk(&self, symbol: &str) -> Result<RiskSnapshot> {
        let chain = self.chain(symbol)?;
        let exposure = chain.exposure.lock().await;
        Ok(RiskSnapshot {
            symbol: symbol.to_string(),
            current_risk: exposure.current_risk,
            max_risk: chain.max_risk,
            zero_conf_enabled: chain.zero_conf_enabled.load(Ordering::SeqCst),
            pending: exposure.pending.len(),
        })
    }
}
