use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use bitcoin::{Transaction, Txid};

use super::ZeroConfRejection;
use super::ledger::RiskLedger;
use crate::chain::{ChainClient, transaction_fee};
use crate::swap::LockupSwap;

/// Lowest fee estimate a node returns, in sat/vbyte. Nothing can pay less than
/// that, so any fee is good enough while the estimate sits there.
const FEE_ESTIMATE_FLOOR: u64 = 2;

/// Lockups paying less than `NUMERATOR / DENOMINATOR` of the estimate are
/// rejected.
const MIN_FEE_NUMERATOR: u128 = 4;
const MIN_FEE_DENOMINATOR: u128 = 5;

/// Decides whether an unconfirmed lockup is trusted. Holds no state of its
/// own; admissions are recorded by the [`RiskLedger`].
pub struct ZeroConfPolicy {
    ledger: Arc<RiskLedger>,
    max_ancestor_depth: usize,
}

impl ZeroConfPolicy {
    pub fn new(ledger: Arc<RiskLedger>, max_ancestor_depth: usize) -> Self {
        Self {
            ledger,
            max_ancestor_depth,
        }
    }

    pub fn ledger(&self) -> &Arc<RiskLedger> {
        &self.ledger
    }

    /// `Ok(None)` when the lockup is admitted, which also records it in the
    /// ledger. The first failing check is the reason of a rejection.
    pub async fn check(
        &self,
        swap: &LockupSwap,
        chain: &dyn ChainClient,
        transaction: &Transaction,
    ) -> Result<Option<ZeroConfRejection>> {
        if !swap.accept_zero_conf() || !self.ledger.zero_conf_accepted(chain.symbol()) {
            return Ok(Some(ZeroConfRejection::NotAccepted));
        }

        if self.signals_rbf(chain, transaction).await {
            return Ok(Some(ZeroConfRejection::SignalsRbf));
        }

        match fee_too_low(chain, transaction).await {
            Ok(true) => return Ok(Some(ZeroConfRejection::LowFee)),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    error = %format!("{err:#}"),
                    swap_id = %swap.id(),
                    "could not determine lockup fee rate"
                );
                return Ok(Some(ZeroConfRejection::NotAccepted));
            }
        }

        let transaction_hex = hex::encode(bitcoin::consensus::serialize(transaction));
        if !self.ledger.is_acceptable(swap, &transaction_hex).await? {
            return Ok(Some(ZeroConfRejection::RiskExceeded));
        }

        Ok(None)
    }

    /// Whether `transaction` or any of its unconfirmed ancestors signals RBF.
    /// Ancestry that cannot be fully inspected counts as signalling.
    pub async fn signals_rbf(&self, chain: &dyn ChainClient, transaction: &Transaction) -> bool {
        if transaction.is_explicitly_rbf() {
            return true;
        }

        let mut visited: HashSet<Txid> = HashSet::new();
        let mut queue: VecDeque<(Txid, usize)> = transaction
            .input
            .iter()
            .map(|input| (input.previous_output.txid, 1))
            .collect();

        while let Some((txid, depth)) = queue.pop_front() {
            if !visited.insert(txid) {
                continue;
            }
            if depth > self.max_ancestor_depth {
                tracing::info!(txid = %txid, depth, "unconfirmed ancestry too deep");
                return true;
            }

            let info = match chain.raw_transaction(&txid).await {
                Ok(Some(info)) => info,
                Ok(None) => {
                    tracing::info!(txid = %txid, "ancestor of lockup not found");
                    return true;
                }
                Err(err) => {
                    tracing::warn!(error = %err, txid = %txid, "failed to fetch lockup ancestor");
                    return true;
                }
            };
            if info.is_confirmed() {
                continue;
            }
            if info.transaction.is_explicitly_rbf() {
                return true;
            }

            queue.extend(
                info.transaction
                    .input
                    .iter()
                    .map(|input| (input.previous_output.txid, depth + 1)),
            );
        }

        false
    }
}

async fn fee_too_low(chain: &dyn ChainClient, transaction: &Transaction) -> Result<bool> {
    let estimate = chain.estimate_fee().await.context("estimate fee")?;
    if estimate <= FEE_ESTIMATE_FLOOR {
        return Ok(false);
    }

    let fee = transaction_fee(chain, transaction).await?;
    let vsize = transaction.vsize() as u128;
    // fee / vsize < 4/5 * estimate, without rounding.
    Ok(u128::from(fee) * MIN_FEE_DENOMINATOR < u128::from(estimate) * vsize * MIN_FEE_NUMERATOR)
}
