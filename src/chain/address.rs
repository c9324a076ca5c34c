use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Script, ScriptBuf};

/// Converts between output scripts and the addresses swaps are stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressCodec {
    network: Network,
}

impl AddressCodec {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// `None` for scripts without an address, like `OP_RETURN` outputs.
    pub fn encode(&self, script: &Script) -> Option<String> {
        Address::from_script(script, self.network)
            .ok()
            .map(|address| address.to_string())
    }

    pub fn decode(&self, address: &str) -> Result<ScriptBuf> {
        let address = Address::<NetworkUnchecked>::from_str(address)
            .with_context(|| format!("parse address {address}"))?
            .require_network(self.network)
            .with_context(|| format!("address {address} is not for {}", self.network))?;
        Ok(address.script_pubkey())
    }
}
