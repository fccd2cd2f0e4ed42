//! Script verification.
//!
//! Executing `scriptSig`/`scriptPubKey` pairs is a large, separate concern
//! (a full Script interpreter), so it's kept behind a trait rather than
//! built into the chain engine: swap in a real interpreter without touching
//! `FullPrunedBlockChain`.

pub mod batch;

use ember_chain::transaction::Transaction;
use ember_chain::transparent::{OutPoint, Output, Script};

use crate::error::TransactionError;

/// `OP_CHECKSIG`/`OP_CHECKSIGVERIFY`, each worth one signature operation.
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
/// `OP_CHECKMULTISIG`/`OP_CHECKMULTISIGVERIFY`. Without parsing the stack to
/// find the preceding `OP_N`, Bitcoin Core counts these as 20 operations
/// each (the "legacy", not "accurate", sigop count) -- the bound this crate
/// uses too, since script interpretation is out of scope.
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
const OP_PUSHDATA4: u8 = 0x4e;

/// Counts the legacy (non-accurate) signature operations in `script`.
///
/// This is a raw byte scan, not a script interpreter: it walks opcodes,
/// skipping over push-data payloads, and tallies `OP_CHECKSIG`-family
/// opcodes. It does not evaluate the script or resolve `OP_CHECKMULTISIG`'s
/// true multisig threshold.
pub fn legacy_sigop_count(script: &Script) -> usize {
    let bytes = &script.0;
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        let opcode = bytes[i];
        i += 1;
        match opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => count += 20,
            0x01..=0x4b => i += opcode as usize,
            0x4c => {
                if let Some(&len) = bytes.get(i) {
                    i += 1 + len as usize;
                }
            }
            0x4d => {
                if let Some(len) = bytes.get(i..i + 2) {
                    let len = u16::from_le_bytes([len[0], len[1]]) as usize;
                    i += 2 + len;
                }
            }
            OP_PUSHDATA4 => {
                if let Some(len) = bytes.get(i..i + 4) {
                    let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
                    i += 4 + len;
                }
            }
            _ => {}
        }
    }
    count
}

/// Verifies that the unlocking script for a transaction input satisfies the
/// locking script of the output it spends.
pub trait ScriptVerifier: Send + Sync {
    /// Checks that `tx`'s input at `input_index` correctly spends `output`.
    fn verify(
        &self,
        tx: &Transaction,
        input_index: usize,
        outpoint: &OutPoint,
        output: &Output,
    ) -> Result<(), TransactionError>;
}

/// A [`ScriptVerifier`] that accepts every script.
///
/// Used by tests that exercise chain-connection and reorganization logic
/// without needing a real Script interpreter.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysValid;

impl ScriptVerifier for AlwaysValid {
    fn verify(
        &self,
        _tx: &Transaction,
        _input_index: usize,
        _outpoint: &OutPoint,
        _output: &Output,
    ) -> Result<(), TransactionError> {
        Ok(())
    }
}
