//! Transaction checks.

use std::collections::HashSet;

use ember_chain::{amount::Amount, transaction::Transaction};

use crate::error::TransactionError;

/// Checks that the transaction has at least one input and at least one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Checks that a non-coinbase transaction does not spend the same outpoint twice.
pub fn has_no_duplicate_inputs(tx: &Transaction) -> Result<(), TransactionError> {
    use ember_chain::transparent::Input;

    let mut seen = HashSet::new();
    for input in &tx.inputs {
        if let Input::PrevOut { outpoint, .. } = input {
            if !seen.insert(outpoint) {
                return Err(TransactionError::DuplicateInput);
            }
        }
    }
    Ok(())
}

/// Checks that the outputs sum to a value that does not overflow the total
/// money supply. Individual output values are already range-checked at
/// deserialization time by [`Amount`]'s type boundary.
pub fn outputs_are_valid(tx: &Transaction) -> Result<(), TransactionError> {
    let mut total = Amount::zero().widen();
    for output in &tx.outputs {
        total = (total + output.value.widen()).map_err(|_| TransactionError::OutputOverflow)?;
    }
    Ok(())
}
