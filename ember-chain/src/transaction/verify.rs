//! Structural (context-free) transaction validity.

use std::collections::HashSet;

use thiserror::Error;

use crate::{amount::MAX_MONEY, transparent};

use super::Transaction;

/// A structural defect in a transaction, independent of the chain it would
/// be included in.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransactionVerifyError {
    /// transaction has no inputs
    #[error("transaction has no inputs")]
    NoInputs,

    /// transaction has no outputs
    #[error("transaction has no outputs")]
    NoOutputs,

    /// transaction spends the same outpoint more than once
    #[error("transaction spends outpoint {0:?} more than once")]
    DuplicateInput(transparent::OutPoint),

    /// an output value, or the sum of all output values, is out of range
    #[error("transaction output total is outside the valid monetary range")]
    ValueOutOfRange,

    /// a script exceeds the encoding Bitcoin allows for scripts
    #[error("script exceeds the maximum allowed size")]
    ScriptTooLarge,
}

/// The maximum size, in bytes, of a single locking or unlocking script.
/// Matches Bitcoin Core's `MAX_SCRIPT_SIZE`.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

impl Transaction {
    /// Checks the structural invariants a transaction must satisfy no matter
    /// which block (if any) it appears in: it has at least one input and
    /// output, it doesn't spend the same outpoint twice, every script is
    /// within the size Bitcoin allows, and its output values are in range
    /// and don't overflow the total money supply.
    pub fn verify(&self) -> Result<(), TransactionVerifyError> {
        if self.inputs.is_empty() {
            return Err(TransactionVerifyError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(TransactionVerifyError::NoOutputs);
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            match input {
                transparent::Input::PrevOut {
                    outpoint,
                    unlock_script,
                    ..
                } => {
                    if !seen.insert(*outpoint) {
                        return Err(TransactionVerifyError::DuplicateInput(*outpoint));
                    }
                    if unlock_script.0.len() > MAX_SCRIPT_SIZE {
                        return Err(TransactionVerifyError::ScriptTooLarge);
                    }
                }
                transparent::Input::Coinbase { data, .. } => {
                    if data.as_ref().len() > 100 {
                        return Err(TransactionVerifyError::ScriptTooLarge);
                    }
                }
            }
        }

        let mut total: i64 = 0;
        for output in &self.outputs {
            if output.lock_script.0.len() > MAX_SCRIPT_SIZE {
                return Err(TransactionVerifyError::ScriptTooLarge);
            }
            let value = output.value.satoshis();
            if !(0..=MAX_MONEY).contains(&value) {
                return Err(TransactionVerifyError::ValueOutOfRange);
            }
            total = total
                .checked_add(value)
                .filter(|total| *total <= MAX_MONEY)
                .ok_or(TransactionVerifyError::ValueOutOfRange)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;
    use crate::{
        amount::Amount,
        cached::Cached,
        transaction::LockTime,
        transparent::{Output, Script},
    };

    fn output(value: i64) -> Output {
        Output {
            value: Amount::try_from(value).unwrap(),
            lock_script: Script(Vec::new()),
        }
    }

    fn coinbase_tx(outputs: Vec<Output>) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![transparent::Input::Coinbase {
                height: None,
                data: transparent::CoinbaseData(vec![0; 4]),
                sequence: 0xffff_ffff,
            }],
            outputs,
            locktime: LockTime::Height(crate::block::Height(0)),
            hash: Cached::new(),
        }
    }

    #[test]
    fn rejects_no_outputs() {
        assert_eq!(
            coinbase_tx(vec![]).verify(),
            Err(TransactionVerifyError::NoOutputs)
        );
    }

    #[test]
    fn accepts_well_formed_coinbase() {
        assert!(coinbase_tx(vec![output(50_0000_0000)]).verify().is_ok());
    }

    #[test]
    fn rejects_value_above_money_supply() {
        assert_eq!(
            coinbase_tx(vec![output(MAX_MONEY), output(1)]).verify(),
            Err(TransactionVerifyError::ValueOutOfRange)
        );
    }
}
