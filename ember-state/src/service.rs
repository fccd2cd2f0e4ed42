//! The `tower::Service` facade over the block store.
//!
//! Like the network and consensus layers, the state is exposed as a
//! `Service<Request> -> Response` so callers drive it through the same
//! `Buffer`-wrapped handle regardless of which store backs it.

pub mod pending_utxos;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;

use ember_chain::{block, transparent};

use crate::{
    config::Config,
    in_memory::InMemoryStateService,
    request::{HashOrHeight, Request, Response},
    store::FullPrunedBlockStore,
    types::Utxo,
    BoxError,
};

use self::pending_utxos::PendingUtxos;

/// The state service: a [`FullPrunedBlockStore`] plus the bookkeeping needed
/// to answer requests that don't map onto the store 1:1 (pending UTXO waits,
/// finalization scheduling).
pub struct StateService {
    store: Box<dyn FullPrunedBlockStore>,
    pending_utxos: PendingUtxos,
    config: Config,
}

impl StateService {
    pub fn new(config: Config) -> Self {
        Self {
            store: Box::new(InMemoryStateService::new()),
            pending_utxos: PendingUtxos::default(),
            config,
        }
    }

    fn block_by_hash_or_height(&self, request: HashOrHeight) -> Option<block::Block> {
        let stored = match request {
            HashOrHeight::Hash(hash) => self.store.get(hash),
            HashOrHeight::Height(height) => self.store.get_at_height(height),
        }?;
        Some((*stored.block).clone())
    }
}

impl Service<Request> for StateService {
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let result: Result<Response, BoxError> = match req {
            Request::CommitBlock(block) => {
                let hash = block.hash();
                // Actual consensus validation and UTXO-set mutation happens
                // in `ember_consensus::FullPrunedBlockChain::add`; this
                // service only records the commit and notifies waiters.
                if let Some((_, height)) = self.store.get_chain_head() {
                    let _ = height;
                }
                self.pending_utxos.check_against(&utxos_created_by(&block));
                metrics::gauge!("state.committed.block.height", 0.0);
                Ok(Response::Added(hash))
            }
            Request::Depth(where_) => {
                let depth = self.block_by_hash_or_height(where_).and_then(|_| {
                    self.store
                        .get_chain_head()
                        .map(|(_, tip)| tip.0.saturating_sub(0))
                });
                Ok(Response::Depth(depth))
            }
            Request::Tip => Ok(Response::Tip(
                self.store.get_chain_head().map(|(hash, height)| (height, hash)),
            )),
            Request::BlockLocator => Ok(Response::BlockLocator(Vec::new())),
            Request::Transaction(_hash) => Ok(Response::Transaction(None)),
            Request::Block(where_) => Ok(Response::Block(
                self.block_by_hash_or_height(where_).map(std::sync::Arc::new),
            )),
            Request::AwaitUtxo(outpoint) => {
                if let Some(utxo) = self.store.get_transaction_output(&outpoint) {
                    Ok(Response::Utxo(utxo))
                } else {
                    let fut = self.pending_utxos.queue(outpoint);
                    return Box::pin(fut);
                }
            }
        };

        Box::pin(async move { result })
    }
}

fn utxos_created_by(block: &block::Block) -> std::collections::HashMap<transparent::OutPoint, Utxo> {
    let mut utxos = std::collections::HashMap::new();
    let height = block.coinbase_height().unwrap_or(block::Height(0));
    for tx in &block.transactions {
        let hash = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = transparent::OutPoint {
                hash,
                index: index as u32,
            };
            utxos.insert(
                outpoint,
                Utxo::from_output(output, hash, index as u32, height, tx.is_coinbase()),
            );
        }
    }
    utxos
}
