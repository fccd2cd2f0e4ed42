//! The legacy (pre-SegWit) transaction signature hash algorithm.

use std::io::Write as _;

use crate::{serialization::sha256d, transparent, BitcoinSerialize};

use super::Transaction;

/// `SIGHASH_ALL`: sign every input and every output.
pub const SIGHASH_ALL: u32 = 0x01;
/// `SIGHASH_NONE`: sign every input, but no outputs (the spender may change them).
pub const SIGHASH_NONE: u32 = 0x02;
/// `SIGHASH_SINGLE`: sign every input, but only the output at the same index.
pub const SIGHASH_SINGLE: u32 = 0x03;
/// `SIGHASH_ANYONECANPAY`: sign only the input being signed, not the others.
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// The hash Bitcoin Core returns for `SIGHASH_SINGLE` when the output at the
/// signed input's index doesn't exist. Every implementation must reproduce
/// this exact value or break compatibility with every signature that relies
/// on it.
const SIGHASH_SINGLE_BUG: [u8; 32] = {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    bytes
};

/// OP_CODESEPARATOR: signatures never cover anything before the last one
/// executed in the subscript they're checked against.
const OP_CODESEPARATOR: u8 = 0xab;

impl Transaction {
    /// Computes the legacy signature hash for the input at `input_index`,
    /// treating `subscript` (the previous output's `scriptPubKey`, with any
    /// `OP_CODESEPARATOR` bytes removed) as the script being satisfied.
    ///
    /// This mirrors Bitcoin Core's `SignatureHash`: build a modified copy of
    /// the transaction according to `sighash_type`, serialize it with the
    /// type appended as a little-endian `u32`, and double-SHA256 the result.
    pub fn hash_for_signature(
        &self,
        input_index: usize,
        subscript: &transparent::Script,
        sighash_type: u32,
    ) -> [u8; 32] {
        let base_type = sighash_type & !SIGHASH_ANYONECANPAY;
        if base_type == SIGHASH_SINGLE && input_index >= self.outputs.len() {
            return SIGHASH_SINGLE_BUG;
        }

        let subscript = strip_code_separators(subscript);

        let mut inputs: Vec<transparent::Input> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| blank_input(input, i, input_index, &subscript))
            .collect();

        if base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE {
            for (i, input) in inputs.iter_mut().enumerate() {
                if i != input_index {
                    zero_sequence(input);
                }
            }
        }

        let outputs = match base_type {
            SIGHASH_NONE => Vec::new(),
            SIGHASH_SINGLE => {
                let mut truncated: Vec<transparent::Output> =
                    self.outputs[..=input_index].to_vec();
                for output in truncated.iter_mut().take(input_index) {
                    *output = transparent::Output {
                        value: crate::amount::Amount::zero(),
                        lock_script: transparent::Script(Vec::new()),
                    };
                }
                truncated
            }
            _ => self.outputs.clone(),
        };

        if sighash_type & SIGHASH_ANYONECANPAY != 0 {
            inputs = vec![inputs[input_index].clone()];
        }

        let stripped = Transaction {
            version: self.version,
            inputs,
            outputs,
            locktime: self.locktime,
            hash: crate::cached::Cached::new(),
        };

        let mut writer = sha256d::Writer::default();
        let _ = stripped.bitcoin_serialize(&mut writer);
        let _ = writer.write_all(&sighash_type.to_le_bytes());
        writer.finish()
    }
}

fn strip_code_separators(script: &transparent::Script) -> transparent::Script {
    transparent::Script(
        script
            .0
            .iter()
            .cloned()
            .filter(|byte| *byte != OP_CODESEPARATOR)
            .collect(),
    )
}

fn blank_input(
    input: &transparent::Input,
    index: usize,
    signed_index: usize,
    subscript: &transparent::Script,
) -> transparent::Input {
    match input {
        transparent::Input::PrevOut {
            outpoint,
            sequence,
            ..
        } => transparent::Input::PrevOut {
            outpoint: *outpoint,
            unlock_script: if index == signed_index {
                subscript.clone()
            } else {
                transparent::Script(Vec::new())
            },
            sequence: *sequence,
        },
        coinbase @ transparent::Input::Coinbase { .. } => coinbase.clone(),
    }
}

fn zero_sequence(input: &mut transparent::Input) {
    match input {
        transparent::Input::PrevOut { sequence, .. } => *sequence = 0,
        transparent::Input::Coinbase { sequence, .. } => *sequence = 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LockTime;
    use crate::transparent::{Input, OutPoint, Output};

    fn sample_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: crate::transaction::Hash([0; 32]),
                    index: 0,
                },
                unlock_script: transparent::Script(Vec::new()),
                sequence: 0xffff_ffff,
            }],
            vec![Output {
                value: crate::amount::Amount::zero(),
                lock_script: transparent::Script(Vec::new()),
            }],
            LockTime::Height(crate::block::Height(0)),
        )
    }

    #[test]
    fn sighash_all_is_deterministic() {
        let tx = sample_tx();
        let script = transparent::Script(vec![0x76, 0xa9]);
        let a = tx.hash_for_signature(0, &script, SIGHASH_ALL);
        let b = tx.hash_for_signature(0, &script, SIGHASH_ALL);
        assert_eq!(a, b);
    }

    #[test]
    fn sighash_single_bug_triggers_out_of_range() {
        let tx = sample_tx();
        let script = transparent::Script(Vec::new());
        let hash = tx.hash_for_signature(5, &script, SIGHASH_SINGLE);
        assert_eq!(hash, SIGHASH_SINGLE_BUG);
    }

    #[test]
    fn different_sighash_types_diverge() {
        let tx = sample_tx();
        let script = transparent::Script(Vec::new());
        let all = tx.hash_for_signature(0, &script, SIGHASH_ALL);
        let none = tx.hash_for_signature(0, &script, SIGHASH_NONE);
        assert_ne!(all, none);
    }
}
