use std::collections::HashSet;
use std::str::FromStr as _;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use bitcoin::{Script, Transaction, Txid};
use tokio::sync::broadcast;

use super::errors::SwapError;
use super::events::SwapEvent;
use super::htlc::{detect_preimage, detect_swap};
use super::overpayment::OverpaymentProtector;
use super::store::SqliteStore;
use super::{LockupSwap, ServerLockupSwap, SwapStatus};
use crate::chain::Currency;
use crate::zeroconf::is_ledger_failure;
use crate::zeroconf::policy::ZeroConfPolicy;

/// Statuses of submarine swaps that may still see their lockup.
const SWAP_AWAITING_LOCKUP: [SwapStatus; 4] = [
    SwapStatus::Created,
    SwapStatus::InvoiceSet,
    SwapStatus::TransactionMempool,
    SwapStatus::TransactionZeroConfRejected,
];

const CHAIN_SWAP_AWAITING_LOCKUP: [SwapStatus; 3] = [
    SwapStatus::Created,
    SwapStatus::TransactionMempool,
    SwapStatus::TransactionZeroConfRejected,
];

const REVERSE_SWAP_CLAIMABLE: [SwapStatus; 2] = [
    SwapStatus::TransactionMempool,
    SwapStatus::TransactionConfirmed,
];

const CHAIN_SWAP_CLAIMABLE: [SwapStatus; 2] = [
    SwapStatus::TransactionServerMempool,
    SwapStatus::TransactionServerConfirmed,
];

/// Matches the transactions of a chain against pending swaps and moves them
/// forward.
pub struct TransactionClassifier {
    store: Arc<Mutex<SqliteStore>>,
    policy: Arc<ZeroConfPolicy>,
    overpayment: OverpaymentProtector,
    events: broadcast::Sender<SwapEvent>,
}

impl TransactionClassifier {
    pub fn new(
        store: Arc<Mutex<SqliteStore>>,
        policy: Arc<ZeroConfPolicy>,
        overpayment: OverpaymentProtector,
        events: broadcast::Sender<SwapEvent>,
    ) -> Self {
        Self {
            store,
            policy,
            overpayment,
            events,
        }
    }

    pub async fn handle_transaction(
        &self,
        currency: &Currency,
        transaction: &Transaction,
        confirmed: bool,
    ) -> Result<()> {
        tokio::try_join!(
            self.check_outputs(currency, transaction, confirmed),
            self.check_claims(currency, transaction),
            self.check_server_lockup(currency, transaction, confirmed),
        )?;
        Ok(())
    }

    /// Catches up on confirmations that were not delivered as transaction
    /// events: user lockups still in the mempool and our own lockups.
    pub async fn handle_block(&self, currency: &Currency, height: u32) -> Result<()> {
        let (lockups, server_lockups) = {
            let store = self.store.lock().expect("store mutex poisoned");
            (
                pending_user_lockups(&store, &currency.symbol)?,
                pending_server_lockups(&store, &currency.symbol)?,
            )
        };

        for swap in lockups {
            let Some(txid) = swap.lockup_transaction_id() else {
                continue;
            };
            if let Err(err) = self.recheck_user_lockup(currency, &swap, txid).await {
                if is_ledger_failure(&err) {
                    return Err(err);
                }
                tracing::warn!(
                    error = %format!("{err:#}"),
                    swap_id = %swap.id(),
                    height,
                    "failed to recheck lockup"
                );
            }
        }

        for swap in server_lockups {
            let Some(txid) = swap.transaction_id() else {
                continue;
            };
            if let Err(err) = self.recheck_server_lockup(currency, swap.clone(), txid).await {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    swap_id = %swap.id(),
                    height,
                    "failed to recheck server lockup"
                );
            }
        }

        Ok(())
    }

    async fn recheck_user_lockup(&self, currency: &Currency, swap: &LockupSwap, txid: &str) -> Result<()> {
        let txid = Txid::from_str(txid).with_context(|| format!("parse lockup txid {txid}"))?;
        let info = currency
            .chain
            .raw_transaction(&txid)
            .await
            .with_context(|| format!("get lockup transaction {txid}"))?;
        if let Some(info) = info
            && info.is_confirmed()
        {
            self.handle_lockup(currency, swap.clone(), &info.transaction, true)
                .await?;
        }
        Ok(())
    }

    async fn recheck_server_lockup(
        &self,
        currency: &Currency,
        swap: ServerLockupSwap,
        txid: &str,
    ) -> Result<()> {
        let txid = Txid::from_str(txid).with_context(|| format!("parse lockup txid {txid}"))?;
        let info = currency
            .chain
            .raw_transaction(&txid)
            .await
            .with_context(|| format!("get server lockup transaction {txid}"))?;
        if let Some(info) = info
            && info.is_confirmed()
        {
            self.confirm_server_lockup(currency, swap, &info.transaction)?;
        }
        Ok(())
    }

    async fn check_outputs(
        &self,
        currency: &Currency,
        transaction: &Transaction,
        confirmed: bool,
    ) -> Result<()> {
        let mut handled = HashSet::new();

        for output in &transaction.output {
            let Some(address) = currency.codec.encode(&output.script_pubkey) else {
                continue;
            };
            let swap = {
                let store = self.store.lock().expect("store mutex poisoned");
                find_lockup_swap(&store, &currency.symbol, &address)?
            };
            let Some(swap) = swap else {
                continue;
            };
            if !handled.insert(swap.id().to_string()) {
                continue;
            }

            self.handle_lockup(currency, swap, transaction, confirmed)
                .await?;
        }

        Ok(())
    }

    async fn handle_lockup(
        &self,
        currency: &Currency,
        mut swap: LockupSwap,
        transaction: &Transaction,
        confirmed: bool,
    ) -> Result<()> {
        let redeem_script = swap.redeem_script()?;
        let Some(output) = detect_swap(&redeem_script, transaction) else {
            tracing::debug!(swap_id = %swap.id(), "no lockup output for redeem script");
            return Ok(());
        };
        let txid = transaction.compute_txid();

        if !confirmed && swap.lockup_transaction_id() == Some(txid.to_string().as_str()) {
            tracing::debug!(swap_id = %swap.id(), txid = %txid, "unconfirmed lockup already recorded");
            return Ok(());
        }

        if let Some(expected) = swap.expected_amount() {
            if output.value < expected {
                return self.fail_lockup(
                    currency,
                    swap,
                    &output.script,
                    SwapError::InsufficientAmount {
                        actual: output.value,
                        expected,
                    },
                );
            }
            if self.overpayment.is_unacceptable_overpay(expected, output.value) {
                return self.fail_lockup(
                    currency,
                    swap,
                    &output.script,
                    SwapError::OverpaidAmount {
                        actual: output.value,
                        expected,
                    },
                );
            }
        }
        swap.set_receiving_amount(output.value);

        if !confirmed
            && let Some(reason) = self
                .policy
                .check(&swap, currency.chain.as_ref(), transaction)
                .await?
        {
            let rejected = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .set_lockup_swap_status(&swap, SwapStatus::TransactionZeroConfRejected)?;
            if !rejected {
                return Ok(());
            }
            swap.set_status(SwapStatus::TransactionZeroConfRejected);

            tracing::info!(
                swap_id = %swap.id(),
                txid = %txid,
                reason = %reason,
                "rejected 0-conf lockup"
            );
            let _ = self.events.send(SwapEvent::ZeroConfRejected {
                swap,
                transaction: transaction.clone(),
                reason,
            });
            return Ok(());
        }

        let updated = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .set_lockup_transaction(&swap, &txid.to_string(), output.vout, output.value, confirmed)?;
        let Some(updated) = updated else {
            tracing::debug!(swap_id = %swap.id(), "swap advanced before its lockup was recorded");
            if !confirmed {
                self.policy.ledger().release(swap.id()).await?;
            }
            return Ok(());
        };
        if confirmed {
            self.policy.ledger().release(updated.id()).await?;
        }

        currency.chain.remove_output_filter(&output.script);
        tracing::info!(
            swap_id = %updated.id(),
            kind = updated.kind(),
            txid = %txid,
            vout = output.vout,
            amount = output.value,
            confirmed,
            "found lockup"
        );
        let _ = self.events.send(SwapEvent::Lockup {
            swap: updated,
            transaction: transaction.clone(),
            confirmed,
        });
        Ok(())
    }

    fn fail_lockup(
        &self,
        currency: &Currency,
        mut swap: LockupSwap,
        script: &Script,
        err: SwapError,
    ) -> Result<()> {
        currency.chain.remove_output_filter(script);

        let failed = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .set_lockup_swap_status(&swap, SwapStatus::TransactionLockupFailed)?;
        if !failed {
            return Ok(());
        }
        swap.set_status(SwapStatus::TransactionLockupFailed);

        tracing::warn!(swap_id = %swap.id(), error = %err, "lockup failed");
        let _ = self.events.send(SwapEvent::LockupFailed {
            swap,
            reason: err.to_string(),
        });
        Ok(())
    }

    async fn check_claims(&self, currency: &Currency, transaction: &Transaction) -> Result<()> {
        for input in &transaction.input {
            let outpoint = input.previous_output;
            let swap = {
                let store = self.store.lock().expect("store mutex poisoned");
                find_claimed_swap(
                    &store,
                    &currency.symbol,
                    &outpoint.txid.to_string(),
                    outpoint.vout,
                )?
            };
            let Some(swap) = swap else {
                continue;
            };

            let Some(preimage) = detect_preimage(input) else {
                tracing::error!(
                    swap_id = %swap.id(),
                    txid = %transaction.compute_txid(),
                    "no preimage in spend of server lockup"
                );
                continue;
            };

            currency.chain.remove_input_filter(&outpoint);
            tracing::info!(
                swap_id = %swap.id(),
                kind = swap.kind(),
                preimage = %hex::encode(preimage),
                "server lockup claimed"
            );
            let _ = self.events.send(SwapEvent::Claimed { swap, preimage });
        }

        Ok(())
    }

    async fn check_server_lockup(
        &self,
        currency: &Currency,
        transaction: &Transaction,
        confirmed: bool,
    ) -> Result<()> {
        if !confirmed {
            return Ok(());
        }

        let txid = transaction.compute_txid().to_string();
        let swap = {
            let store = self.store.lock().expect("store mutex poisoned");
            find_server_lockup_swap(&store, &currency.symbol, &txid)?
        };
        match swap {
            Some(swap) => self.confirm_server_lockup(currency, swap, transaction),
            None => Ok(()),
        }
    }

    fn confirm_server_lockup(
        &self,
        currency: &Currency,
        mut swap: ServerLockupSwap,
        transaction: &Transaction,
    ) -> Result<()> {
        match currency.codec.decode(swap.lockup_address()) {
            Ok(script) => currency.chain.remove_output_filter(&script),
            Err(err) => tracing::warn!(error = %err, swap_id = %swap.id(), "invalid server lockup address"),
        }

        let status = swap.confirmed_status();
        let updated = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .set_server_lockup_status(&swap, status)?;
        if !updated {
            return Ok(());
        }
        swap.set_status(status);

        tracing::info!(
            swap_id = %swap.id(),
            kind = swap.kind(),
            txid = %transaction.compute_txid(),
            "server lockup confirmed"
        );
        let _ = self.events.send(SwapEvent::ServerLockupConfirmed {
            swap,
            transaction: transaction.clone(),
        });
        Ok(())
    }
}

fn find_lockup_swap(store: &SqliteStore, symbol: &str, address: &str) -> Result<Option<LockupSwap>> {
    if let Some(swap) = store.swap_by_lockup_address(address, &SWAP_AWAITING_LOCKUP)?
        && swap.chain_symbol() == symbol
    {
        return Ok(Some(LockupSwap::Submarine(swap)));
    }
    if let Some(swap) = store.chain_swap_by_receiving_address(address, &CHAIN_SWAP_AWAITING_LOCKUP)?
        && swap.receiving.symbol == symbol
    {
        return Ok(Some(LockupSwap::Chain(swap)));
    }
    Ok(None)
}

fn find_claimed_swap(
    store: &SqliteStore,
    symbol: &str,
    txid: &str,
    vout: u32,
) -> Result<Option<ServerLockupSwap>> {
    if let Some(swap) = store.reverse_swap_by_outpoint(txid, vout, &REVERSE_SWAP_CLAIMABLE)?
        && swap.chain_symbol() == symbol
    {
        return Ok(Some(ServerLockupSwap::Reverse(swap)));
    }
    if let Some(swap) = store.chain_swap_by_sending_outpoint(txid, vout, &CHAIN_SWAP_CLAIMABLE)?
        && swap.sending.symbol == symbol
    {
        return Ok(Some(ServerLockupSwap::Chain(swap)));
    }
    Ok(None)
}

fn find_server_lockup_swap(
    store: &SqliteStore,
    symbol: &str,
    txid: &str,
) -> Result<Option<ServerLockupSwap>> {
    if let Some(swap) =
        store.reverse_swap_by_transaction_id(txid, &[SwapStatus::TransactionMempool])?
        && swap.chain_symbol() == symbol
    {
        return Ok(Some(ServerLockupSwap::Reverse(swap)));
    }
    if let Some(swap) =
        store.chain_swap_by_sending_transaction_id(txid, &[SwapStatus::TransactionServerMempool])?
        && swap.sending.symbol == symbol
    {
        return Ok(Some(ServerLockupSwap::Chain(swap)));
    }
    Ok(None)
}

fn pending_user_lockups(store: &SqliteStore, symbol: &str) -> Result<Vec<LockupSwap>> {
    let swaps = store
        .swaps_by_status(&[SwapStatus::TransactionMempool])?
        .into_iter()
        .filter(|swap| swap.chain_symbol() == symbol)
        .map(LockupSwap::Submarine);
    let chain_swaps = store
        .chain_swaps_by_status(&[SwapStatus::TransactionMempool])?
        .into_iter()
        .filter(|swap| swap.receiving.symbol == symbol)
        .map(LockupSwap::Chain);
    Ok(swaps.chain(chain_swaps).collect())
}

fn pending_server_lockups(store: &SqliteStore, symbol: &str) -> Result<Vec<ServerLockupSwap>> {
    let reverse_swaps = store
        .reverse_swaps_by_status(&[SwapStatus::TransactionMempool])?
        .into_iter()
        .filter(|swap| swap.chain_symbol() == symbol)
        .map(ServerLockupSwap::Reverse);
    let chain_swaps = store
        .chain_swaps_by_status(&[SwapStatus::TransactionServerMempool])?
        .into_iter()
        .filter(|swap| swap.sending.symbol == symbol)
        .map(ServerLockupSwap::Chain);
    Ok(reverse_swaps.chain(chain_swaps).collect())
}
