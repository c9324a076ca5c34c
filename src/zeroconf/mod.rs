pub mod ledger;
pub mod policy;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Why an unconfirmed lockup was not accepted. The swap keeps waiting for a
/// confirmation; nothing about it is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ZeroConfRejection {
    #[error("swap does not accept 0-conf")]
    NotAccepted,
    #[error("lockup transaction signals RBF")]
    SignalsRbf,
    #[error("lockup transaction fee is too low")]
    LowFee,
    #[error("0-conf risk limit reached")]
    RiskExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    #[error("lockups of {0} are not being tracked")]
    SymbolNotTracked(String),

    #[error("risk ledger of {symbol} could not be updated: {reason}")]
    Ledger { symbol: String, reason: String },
}

/// The part of the rate subsystem that limits how much is accepted with 0-conf.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn set_zero_conf_amount(&self, symbol: &str, amount: u64) -> Result<()>;
}

/// Whether `err` was caused by a failed ledger mutation. Those must stop the
/// worker instead of letting the in-memory risk drift from the persisted one.
pub fn is_ledger_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<RiskError>(), Some(RiskError::Ledger { .. })))
}
