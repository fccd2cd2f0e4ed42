use std::sync::Arc;

use proptest::{collection::vec, prelude::*};

use crate::{cached::Cached, transparent};

use super::{LockTime, Transaction};

impl Transaction {
    /// Generates an arbitrary transaction with `input_count` plain
    /// (non-coinbase) inputs.
    pub fn strategy(input_count: impl Into<proptest::collection::SizeRange>) -> BoxedStrategy<Self> {
        (
            transparent::Input::vec_strategy(input_count),
            vec(any::<transparent::Output>(), 0..10),
            any::<LockTime>(),
        )
            .prop_map(|(inputs, outputs, locktime)| Transaction {
                version: 1,
                inputs,
                outputs,
                locktime,
                hash: Cached::new(),
            })
            .boxed()
    }

    /// Generates a vector of `len` arbitrary transactions, where the first is
    /// always a coinbase transaction and the rest are plain transactions.
    pub fn vec_strategy(len: usize) -> BoxedStrategy<Vec<Arc<Self>>> {
        let coinbase = (
            vec(transparent::Input::coinbase_strategy(), 1),
            vec(any::<transparent::Output>(), 1..10),
            any::<LockTime>(),
        )
            .prop_map(|(inputs, outputs, locktime)| {
                Arc::new(Transaction {
                    version: 1,
                    inputs,
                    outputs,
                    locktime,
                    hash: Cached::new(),
                })
            });
        let remainder = vec(Transaction::strategy(1..3).prop_map(Arc::new), len);

        (coinbase, remainder)
            .prop_map(|(first, mut remainder)| {
                remainder.insert(0, first);
                remainder
            })
            .boxed()
    }
}

impl Arbitrary for Transaction {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        Self::strategy(0..10)
    }

    type Strategy = BoxedStrategy<Self>;
}
