use bitcoin::hashes::{Hash as _, hash160, sha256};
use bitcoin::opcodes;
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::{Address, Network, Transaction, TxIn};

const PREIMAGE_SIZE: usize = 32;

/// Hash time locked contract claimable with a preimage or refundable after a
/// block height.
#[derive(Debug, Clone)]
pub struct HtlcSpec {
    pub payment_hash: [u8; 32],
    pub claimer_pubkey_hash160: [u8; 20],
    pub refunder_pubkey_hash160: [u8; 20],
    pub refund_lock_height: u32,
}

impl HtlcSpec {
    pub fn redeem_script(&self) -> ScriptBuf {
        Builder::new()
            .push_opcode(opcodes::all::OP_IF)
            .push_opcode(opcodes::all::OP_SIZE)
            .push_int(PREIMAGE_SIZE as i64)
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_SHA256)
            .push_slice(self.payment_hash)
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_DUP)
            .push_opcode(opcodes::all::OP_HASH160)
            .push_slice(self.claimer_pubkey_hash160)
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_CHECKSIG)
            .push_opcode(opcodes::all::OP_ELSE)
            .push_int(i64::from(self.refund_lock_height))
            .push_opcode(opcodes::all::OP_CLTV)
            .push_opcode(opcodes::all::OP_DROP)
            .push_opcode(opcodes::all::OP_DUP)
            .push_opcode(opcodes::all::OP_HASH160)
            .push_slice(self.refunder_pubkey_hash160)
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_CHECKSIG)
            .push_opcode(opcodes::all::OP_ENDIF)
            .into_script()
    }

    pub fn p2wsh_address(&self, network: Network) -> Address {
        Address::p2wsh(&self.redeem_script(), network)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Bech32,
    Compatibility,
    Legacy,
}

/// Output of a transaction that locks coins to a swap's redeem script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutput {
    pub vout: u32,
    pub value: u64,
    pub script: ScriptBuf,
    pub output_type: OutputType,
}

/// Every output script a redeem script can be locked to.
pub fn lockup_scripts(redeem_script: &Script) -> [(OutputType, ScriptBuf); 3] {
    let p2wsh = ScriptBuf::new_p2wsh(&redeem_script.wscript_hash());
    let nested = ScriptBuf::new_p2sh(&p2wsh.script_hash());

    [
        (OutputType::Bech32, p2wsh),
        (OutputType::Compatibility, nested),
        (OutputType::Legacy, ScriptBuf::new_p2sh(&redeem_script.script_hash())),
    ]
}

/// Finds the first output of `transaction` paying to `redeem_script`.
pub fn detect_swap(redeem_script: &Script, transaction: &Transaction) -> Option<SwapOutput> {
    let candidates = lockup_scripts(redeem_script);

    transaction
        .output
        .iter()
        .enumerate()
        .find_map(|(vout, output)| {
            let (output_type, _) = candidates
                .iter()
                .find(|(_, script)| *script == output.script_pubkey)?;

            Some(SwapOutput {
                vout: u32::try_from(vout).ok()?,
                value: output.value.to_sat(),
                script: output.script_pubkey.clone(),
                output_type: *output_type,
            })
        })
}

/// Extracts the preimage revealed by an input claiming a swap output.
///
/// Claims put the preimage either first (cooperative spends of legacy scripts)
/// or right after the signature in the witness; non segwit claims push it in
/// the unlocking script.
pub fn detect_preimage(input: &TxIn) -> Option<[u8; 32]> {
    let witness = &input.witness;
    for index in 0..witness.len().min(2) {
        if let Some(item) = witness.nth(index)
            && item.len() == PREIMAGE_SIZE
        {
            return item.try_into().ok();
        }
    }

    input
        .script_sig
        .instructions()
        .filter_map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes()),
            _ => None,
        })
        .find(|bytes| bytes.len() == PREIMAGE_SIZE)
        .and_then(|bytes| bytes.try_into().ok())
}

pub fn sha256_preimage(preimage: &[u8; 32]) -> [u8; 32] {
    sha256::Hash::hash(preimage).to_byte_array()
}

pub fn pubkey_hash160(pubkey_bytes: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(pubkey_bytes).to_byte_array()
}
