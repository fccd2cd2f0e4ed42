use std::sync::Arc;

use crate::work::difficulty::CompactDifficulty;

use super::*;

use chrono::{TimeZone, Utc};
use proptest::{
    arbitrary::{any, Arbitrary},
    prelude::*,
};

impl Arbitrary for Block {
    type Parameters = usize;

    fn arbitrary_with(transaction_count: Self::Parameters) -> Self::Strategy {
        let transactions_strategy = Transaction::vec_strategy(transaction_count);

        (any::<Header>(), transactions_strategy)
            .prop_map(|(header, transactions)| Self {
                header,
                transactions,
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Block {
    /// Returns a strategy generating `count` blocks, each with a random
    /// header and a coinbase plus a couple of ordinary transactions.
    ///
    /// Headers are generated independently, so the returned blocks do not
    /// chain together via `previous_block_hash`; callers that need a linked
    /// chain should patch that field in afterward.
    pub fn partial_chain_strategy(count: usize) -> BoxedStrategy<Vec<Arc<Self>>> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            blocks.push(Block::arbitrary_with(2).prop_map(Arc::new));
        }
        blocks.boxed()
    }
}

impl Arbitrary for Header {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            // The version is interpreted as i32 on the wire, so limit to i32::MAX here.
            (4u32..(i32::MAX as u32)),
            any::<Hash>(),
            any::<merkle::Root>(),
            // Block times are interpreted as u32 on the wire, but chrono uses i64.
            (0i64..(u32::MAX as i64)),
            any::<CompactDifficulty>(),
            (0u32..(u32::MAX)),
        )
            .prop_map(
                |(
                    version,
                    previous_block_hash,
                    merkle_root,
                    timestamp,
                    difficulty_threshold,
                    nonce,
                )| {
                    Header::new(
                        version,
                        previous_block_hash,
                        merkle_root,
                        Utc.timestamp(timestamp, 0),
                        difficulty_threshold,
                        nonce,
                    )
                },
            )
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
