//! Generic batching middleware over a [`tower::Service`].
//!
//! Some verification work is cheaper done in bulk than one request at a
//! time (a single batched elliptic-curve signature check instead of N
//! independent ones). This crate provides the plumbing to collect nearby
//! requests into a batch without making every caller coordinate directly:
//! wrap an inner `Service<BatchControl<Request>>` in [`Batch`], and every
//! cloned handle can call it with a plain `Request` as if it were
//! unbatched.
//!
//! The inner service decides what a "batch" means for its own request
//! type: it receives each request wrapped in [`BatchControl::Item`], and a
//! [`BatchControl::Flush`] whenever the outer worker decides the batch is
//! full (`max_items`) or has waited long enough (`max_latency`). A
//! verifier that wants real batching accumulates `Item`s internally and
//! only resolves them on `Flush`; one that doesn't care can just treat
//! `Item` and `Flush` as the same thing.

mod error;
mod future;
mod layer;
mod message;
mod semaphore;
mod service;
mod worker;

pub use error::{BoxError, Closed, ServiceError};
pub use future::ResponseFuture;
pub use layer::BatchLayer;
pub use service::Batch;

/// The request type an inner service wrapped by [`Batch`] must accept:
/// either one item from the batch, or a signal that the worker has decided
/// the current batch is complete and should be resolved.
#[derive(Debug)]
pub enum BatchControl<Request> {
    /// One request, to be added to the in-progress batch.
    Item(Request),
    /// The worker has decided the in-progress batch is complete (it either
    /// reached its item cap or has been open longer than the configured
    /// latency bound) and the inner service should resolve it now.
    Flush,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };
    use tower::Service;

    /// A toy inner service: accumulates `Item`s until `Flush`, then
    /// resolves every accumulated item to the batch's total count.
    struct CountingBatcher {
        pending: Vec<tokio::sync::oneshot::Sender<usize>>,
        flushes: Arc<AtomicUsize>,
    }

    impl Service<BatchControl<tokio::sync::oneshot::Sender<usize>>> for CountingBatcher {
        type Response = ();
        type Error = BoxError;
        type Future = futures::future::Ready<Result<(), BoxError>>;

        fn poll_ready(
            &mut self,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: BatchControl<tokio::sync::oneshot::Sender<usize>>) -> Self::Future {
            match req {
                BatchControl::Item(tx) => {
                    self.pending.push(tx);
                }
                BatchControl::Flush => {
                    self.flushes.fetch_add(1, Ordering::SeqCst);
                    let count = self.pending.len();
                    for tx in self.pending.drain(..) {
                        let _ = tx.send(count);
                    }
                }
            }
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn flushes_when_max_items_reached() {
        let flushes = Arc::new(AtomicUsize::new(0));
        let inner = CountingBatcher {
            pending: Vec::new(),
            flushes: flushes.clone(),
        };
        let mut batch = Batch::new(inner, 2, Duration::from_secs(10), Some(16));

        let (tx1, rx1) = tokio::sync::oneshot::channel();
        let (tx2, rx2) = tokio::sync::oneshot::channel();

        futures::future::poll_fn(|cx| batch.poll_ready(cx))
            .await
            .unwrap();
        batch.call(tx1).await.unwrap();
        futures::future::poll_fn(|cx| batch.poll_ready(cx))
            .await
            .unwrap();
        batch.call(tx2).await.unwrap();

        assert_eq!(rx1.await.unwrap(), 2);
        assert_eq!(rx2.await.unwrap(), 2);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
    }
}
