use bitcoin::Transaction;

use super::{ChainSwap, LockupSwap, ReverseSwap, ServerLockupSwap, Swap};
use crate::zeroconf::ZeroConfRejection;

/// Notifications for the subsystems downstream of the chain watchers.
#[derive(Debug, Clone)]
pub enum SwapEvent {
    /// `swap.lockup`
    Lockup {
        swap: LockupSwap,
        transaction: Transaction,
        confirmed: bool,
    },
    /// `swap.lockup.failed`
    LockupFailed { swap: LockupSwap, reason: String },
    /// `swap.lockup.zeroconf.rejected`
    ZeroConfRejected {
        swap: LockupSwap,
        transaction: Transaction,
        reason: ZeroConfRejection,
    },
    /// `swap.expired`
    SwapExpired(Swap),

    /// `reverseSwap.lockup.confirmed`
    ServerLockupConfirmed {
        swap: ServerLockupSwap,
        transaction: Transaction,
    },
    /// `reverseSwap.claimed`
    Claimed {
        swap: ServerLockupSwap,
        preimage: [u8; 32],
    },
    /// `reverseSwap.expired`
    ReverseSwapExpired(ReverseSwap),
    ChainSwapExpired(ChainSwap),

    /// `zeroConf.disabled`
    ZeroConfDisabled { symbol: String },
}

impl SwapEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SwapEvent::Lockup { .. } => "swap.lockup",
            SwapEvent::LockupFailed { .. } => "swap.lockup.failed",
            SwapEvent::ZeroConfRejected { .. } => "swap.lockup.zeroconf.rejected",
            SwapEvent::SwapExpired(_) => "swap.expired",
            SwapEvent::ServerLockupConfirmed { .. } => "reverseSwap.lockup.confirmed",
            SwapEvent::Claimed { .. } => "reverseSwap.claimed",
            SwapEvent::ReverseSwapExpired(_) => "reverseSwap.expired",
            SwapEvent::ChainSwapExpired(_) => "chainSwap.expired",
            SwapEvent::ZeroConfDisabled { .. } => "zeroConf.disabled",
        }
    }
}
