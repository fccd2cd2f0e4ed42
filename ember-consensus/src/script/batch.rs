//! Adapts a synchronous [`ScriptVerifier`] to the `tower::Service` seam
//! [`tower_batch::Batch`] wraps, the same way a synchronous signature check
//! gets adapted into a batch signature verifier.
//!
//! The oracle in this crate is a pure function (`verify` never defers or
//! blocks), so there's no arithmetic to amortize across a batch the way a
//! real elliptic-curve batch verifier amortizes a single multi-scalar
//! multiplication. What this module buys is the *pipelining* seam: a
//! [`Batch`](tower_batch::Batch) handle can be cloned across every
//! connecting-block task, submissions queue through one worker, and a
//! future async script-verification backend (one that genuinely batches,
//! e.g. a microservice call) can be dropped in behind [`BatchVerifier`]
//! without touching `FullPrunedBlockChain`.

use std::sync::Arc;

use ember_chain::transaction::Transaction;
use ember_chain::transparent::{OutPoint, Output};
use tower::Service;
use tower_batch::BatchControl;

use crate::error::TransactionError;
use crate::script::ScriptVerifier;

/// One script-verification request: everything [`ScriptVerifier::verify`]
/// needs, owned so it can cross a channel into the batch worker.
#[derive(Clone, Debug)]
pub struct Item {
    tx: Arc<Transaction>,
    input_index: usize,
    outpoint: OutPoint,
    output: Output,
}

impl Item {
    /// Builds a verification request for `tx`'s input at `input_index`,
    /// which spends `outpoint` carrying `output`.
    pub fn new(tx: Arc<Transaction>, input_index: usize, outpoint: OutPoint, output: Output) -> Self {
        Item {
            tx,
            input_index,
            outpoint,
            output,
        }
    }
}

/// Wraps a synchronous [`ScriptVerifier`] as a `Service<BatchControl<Item>>`,
/// ready to be handed to [`tower_batch::Batch::new`].
#[derive(Clone, Debug)]
pub struct BatchVerifier<V> {
    inner: V,
}

impl<V> BatchVerifier<V>
where
    V: ScriptVerifier,
{
    pub fn new(inner: V) -> Self {
        BatchVerifier { inner }
    }
}

impl<V> Service<BatchControl<Item>> for BatchVerifier<V>
where
    V: ScriptVerifier,
{
    type Response = ();
    type Error = TransactionError;
    type Future = futures::future::Ready<Result<(), TransactionError>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BatchControl<Item>) -> Self::Future {
        match req {
            BatchControl::Item(item) => futures::future::ready(self.inner.verify(
                &item.tx,
                item.input_index,
                &item.outpoint,
                &item.output,
            )),
            // Nothing to accumulate: each item already resolved eagerly on
            // arrival, so a flush is a no-op.
            BatchControl::Flush => futures::future::ready(Ok(())),
        }
    }
}
