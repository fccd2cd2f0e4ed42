//! The client-facing half of the batch middleware: a cheaply `Clone`able
//! handle that enqueues requests for the background [`Worker`](super::worker::Worker).

use super::{
    error::{BoxError, Closed, ServiceError},
    future::ResponseFuture,
    message::Message,
    semaphore::{Permit, Semaphore},
    worker::Worker,
    BatchControl,
};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tower::Service;

/// A batching wrapper around an inner `Service<BatchControl<Request>>`.
///
/// Cloning a `Batch` is cheap: every clone shares the same channel to the
/// same background worker, mirroring the way `tower::Buffer` lets many
/// callers share one single-writer task.
pub struct Batch<S, Request>
where
    S: Service<BatchControl<Request>>,
{
    tx: mpsc::Sender<Message<Request, S::Future>>,
    semaphore: Semaphore,
    /// A permit acquired during `poll_ready`, consumed by the next `call`.
    /// `Service`'s contract guarantees callers only call `call` after
    /// `poll_ready` returned `Ready`, so this is always `Some` by then.
    permit: Option<Permit>,
    acquire: Pin<Box<dyn Future<Output = Option<Permit>> + Send + Sync>>,
    // Retained so a failed `poll_ready` can surface the worker's terminal
    // error to every remaining caller, the way `tower::Buffer` does.
    error: Arc<Mutex<Option<ServiceError>>>,
}

impl<S, Request> Batch<S, Request>
where
    S: Service<BatchControl<Request>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send + Sync + 'static,
    Request: Send + 'static,
{
    /// Wraps `service`, spawning a [`Worker`] task that accumulates up to
    /// `max_items` requests (or waits at most `max_latency` for more) before
    /// flushing a batch through to `service`. `bound` caps the number of
    /// requests that may be queued awaiting that flush.
    pub fn new(service: S, max_items: usize, max_latency: Duration, bound: Option<usize>) -> Self {
        let (tx, rx) = mpsc::channel(bound.unwrap_or(1024).max(1));
        let semaphore = Semaphore::new_with_permits(bound);
        let error = Arc::new(Mutex::new(None));

        let worker = Worker::new(service, rx, max_items, max_latency, semaphore.clone(), error.clone());
        tokio::spawn(worker.run());

        let acquire = {
            let semaphore = semaphore.clone();
            Box::pin(async move { semaphore.acquire().await }) as Pin<Box<dyn Future<Output = _> + Send + Sync>>
        };

        Batch {
            tx,
            semaphore,
            permit: None,
            acquire,
            error,
        }
    }

    fn get_worker_error(&self) -> ServiceError {
        self.error
            .lock()
            .expect("worker panicked while holding the error lock")
            .as_ref()
            .map(ServiceError::clone_inner)
            .unwrap_or_else(|| ServiceError::new(Box::new(Closed::new())))
    }
}

impl<S, Request> Service<Request> for Batch<S, Request>
where
    S: Service<BatchControl<Request>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send + Sync + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = ServiceError;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.permit.is_some() {
            return Poll::Ready(Ok(()));
        }
        if self.tx.is_closed() {
            return Poll::Ready(Err(self.get_worker_error()));
        }
        match self.acquire.as_mut().poll(cx) {
            Poll::Ready(Some(permit)) => {
                self.permit = Some(permit);
                // Reset the acquire future for the *next* `poll_ready`
                // call, once this permit is consumed by `call`.
                let semaphore = self.semaphore.clone();
                self.acquire = Box::pin(async move { semaphore.acquire().await });
                Poll::Ready(Ok(()))
            }
            Poll::Ready(None) => Poll::Ready(Err(self.get_worker_error())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let permit = self
            .permit
            .take()
            .expect("poll_ready must be called and return Ready before call");

        let tx = self.tx.clone();
        let span = tracing::Span::current();
        let (response_tx, response_rx) = oneshot::channel();

        let message = Message {
            request,
            tx: response_tx,
            span,
            _permit: permit,
        };

        if tx.try_send(message).is_err() {
            return ResponseFuture::failed(self.get_worker_error());
        }

        ResponseFuture::new(response_rx)
    }
}

impl<S, Request> Clone for Batch<S, Request>
where
    S: Service<BatchControl<Request>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send + Sync + 'static,
    Request: Send + 'static,
{
    fn clone(&self) -> Self {
        let semaphore = self.semaphore.clone();
        Batch {
            tx: self.tx.clone(),
            semaphore: semaphore.clone(),
            permit: None,
            acquire: Box::pin(async move { semaphore.acquire().await }),
            error: self.error.clone(),
        }
    }
}
