use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chain::{ChainEvent, Currency};
use crate::swap::classifier::TransactionClassifier;
use crate::swap::expiry::ExpiryWatcher;
use crate::zeroconf::is_ledger_failure;
use crate::zeroconf::ledger::RiskLedger;

/// Consumes the events of one chain. Chains get a worker each so a slow node
/// never holds up the others.
pub struct ChainWorker {
    currency: Currency,
    classifier: Arc<TransactionClassifier>,
    expiry: Arc<ExpiryWatcher>,
    ledger: Arc<RiskLedger>,
}

impl ChainWorker {
    pub fn new(
        currency: Currency,
        classifier: Arc<TransactionClassifier>,
        expiry: Arc<ExpiryWatcher>,
        ledger: Arc<RiskLedger>,
    ) -> Self {
        Self {
            currency,
            classifier,
            expiry,
            ledger,
        }
    }

    /// Subscribes right away, so nothing emitted after this call is missed.
    /// The task ends when the chain client goes away, or with an error when
    /// the risk ledger could not be updated.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        let events = self.currency.chain.subscribe();
        tokio::spawn(async move { self.run(events).await })
    }

    async fn run(self, mut events: mpsc::Receiver<ChainEvent>) -> Result<()> {
        let symbol = self.currency.symbol.clone();
        tracing::info!(symbol = %symbol, "chain worker started");

        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle(&event).await {
                if is_ledger_failure(&err) {
                    tracing::error!(error = %format!("{err:#}"), symbol = %symbol, "risk ledger failure");
                    return Err(err);
                }
                tracing::warn!(error = %format!("{err:#}"), symbol = %symbol, "chain worker error");
            }
        }

        tracing::info!(symbol = %symbol, "chain worker stopped");
        Ok(())
    }

    async fn handle(&self, event: &ChainEvent) -> Result<()> {
        match event {
            ChainEvent::Block { height } => {
                self.reconcile(*height).await?;
                self.classifier
                    .handle_block(&self.currency, *height)
                    .await
                    .context("recheck pending lockups")?;
                self.expiry
                    .handle_block(&self.currency, *height)
                    .context("expire swaps")?;
            }
            ChainEvent::Transaction {
                transaction,
                confirmed,
            } => {
                self.classifier
                    .handle_transaction(&self.currency, transaction, *confirmed)
                    .await
                    .with_context(|| format!("classify {}", transaction.compute_txid()))?;
            }
        }
        Ok(())
    }

    /// Only ledger failures are returned; the rest of the block is handled
    /// even when the node could not be asked about pending lockups.
    async fn reconcile(&self, height: u32) -> Result<()> {
        let symbol = &self.currency.symbol;
        if let Err(err) = self.ledger.reconcile(&self.currency).await {
            if is_ledger_failure(&err) {
                return Err(err.context("reconcile risk ledger"));
            }
            tracing::warn!(error = %format!("{err:#}"), symbol = %symbol, height, "failed to reconcile risk ledger");
        }

        if let Ok(risk) = self.ledger.risk(symbol).await {
            tracing::debug!(
                symbol = %symbol,
                height,
                current_risk = risk.current_risk,
                max_risk = risk.max_risk,
                pending = risk.pending,
                zero_conf_enabled = risk.zero_conf_enabled,
                "0-conf risk"
            );
        }
        Ok(())
    }
}
