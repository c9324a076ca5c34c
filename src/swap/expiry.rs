use std::str::FromStr as _;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bitcoin::{OutPoint, Txid};
use tokio::sync::broadcast;

use super::SwapStatus;
use super::events::SwapEvent;
use super::store::SqliteStore;
use crate::chain::Currency;

/// Expires swaps of a chain once its height reaches their timeout.
pub struct ExpiryWatcher {
    store: Arc<Mutex<SqliteStore>>,
    events: broadcast::Sender<SwapEvent>,
}

impl ExpiryWatcher {
    pub fn new(store: Arc<Mutex<SqliteStore>>, events: broadcast::Sender<SwapEvent>) -> Self {
        Self { store, events }
    }

    pub fn handle_block(&self, currency: &Currency, height: u32) -> Result<()> {
        self.expire_swaps(currency, height)?;
        self.expire_reverse_swaps(currency, height)?;
        self.expire_chain_swaps(currency, height)?;
        Ok(())
    }

    fn expire_swaps(&self, currency: &Currency, height: u32) -> Result<()> {
        let swaps = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .swaps_expirable(height)?;

        for mut swap in swaps {
            if swap.chain_symbol() != currency.symbol {
                continue;
            }
            remove_address_filter(currency, &swap.id, &swap.lockup_address);

            let expired = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .set_swap_status(&swap.id, &[swap.status], SwapStatus::Expired)?;
            if !expired {
                continue;
            }
            swap.status = SwapStatus::Expired;

            tracing::info!(swap_id = %swap.id, height, "swap expired");
            let _ = self.events.send(SwapEvent::SwapExpired(swap));
        }
        Ok(())
    }

    fn expire_reverse_swaps(&self, currency: &Currency, height: u32) -> Result<()> {
        let swaps = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .reverse_swaps_expirable(height)?;

        for mut swap in swaps {
            if swap.chain_symbol() != currency.symbol {
                continue;
            }
            remove_address_filter(currency, &swap.id, &swap.lockup_address);
            if let (Some(txid), Some(vout)) = (&swap.transaction_id, swap.transaction_vout) {
                match Txid::from_str(txid) {
                    Ok(txid) => currency.chain.remove_input_filter(&OutPoint { txid, vout }),
                    Err(err) => {
                        tracing::warn!(error = %err, swap_id = %swap.id, "invalid lockup txid");
                    }
                }
            }

            let expired = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .set_reverse_swap_status(&swap.id, &[swap.status], SwapStatus::Expired)?;
            if !expired {
                continue;
            }
            swap.status = SwapStatus::Expired;

            tracing::info!(swap_id = %swap.id, height, "reverse swap expired");
            let _ = self.events.send(SwapEvent::ReverseSwapExpired(swap));
        }
        Ok(())
    }

    fn expire_chain_swaps(&self, currency: &Currency, height: u32) -> Result<()> {
        let swaps = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .chain_swaps_expirable(&currency.symbol, height)?;

        for mut swap in swaps {
            remove_address_filter(currency, &swap.id, &swap.receiving.lockup_address);

            let expired = self
                .store
                .lock()
                .expect("store mutex poisoned")
                .set_chain_swap_status(&swap.id, &[swap.status], SwapStatus::Expired)?;
            if !expired {
                continue;
            }
            swap.status = SwapStatus::Expired;

            tracing::info!(swap_id = %swap.id, height, "chain swap expired");
            let _ = self.events.send(SwapEvent::ChainSwapExpired(swap));
        }
        Ok(())
    }
}

fn remove_address_filter(currency: &Currency, swap_id: &str, address: &str) {
    match currency.codec.decode(address) {
        Ok(script) => currency.chain.remove_output_filter(&script),
        Err(err) => tracing::warn!(error = %err, swap_id = %swap_id, "invalid lockup address"),
    }
}
