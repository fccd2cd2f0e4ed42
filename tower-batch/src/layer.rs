//! `tower::Layer` for wrapping a service in batching middleware.

use super::{service::Batch, BatchControl};
use std::{fmt, marker::PhantomData, time::Duration};
use tower::Service;

/// Adds a batching layer in front of an inner service.
///
/// The inner service must accept `BatchControl<Request>`: either an `Item`
/// request or a `Flush` signal the worker sends once a batch is ready
/// (either because it reached `max_items`, or `max_latency` elapsed since
/// the first item in the batch arrived).
pub struct BatchLayer<Request> {
    max_items: usize,
    max_latency: Duration,
    bound: Option<usize>,
    _p: PhantomData<fn(Request)>,
}

impl<Request> BatchLayer<Request> {
    /// Creates a new batching layer.
    ///
    /// `max_items` caps how many requests accumulate into one batch;
    /// `max_latency` caps how long the first request in a batch waits for
    /// company before the worker flushes early. `bound` is the maximum
    /// number of requests permitted in flight at once (backpressure);
    /// `None` means unbounded.
    pub fn new(max_items: usize, max_latency: Duration, bound: Option<usize>) -> Self {
        BatchLayer {
            max_items,
            max_latency,
            bound,
            _p: PhantomData,
        }
    }
}

impl<S, Request> tower::layer::Layer<S> for BatchLayer<Request>
where
    S: Service<BatchControl<Request>> + Send + 'static,
    S::Future: Send,
    S::Error: Into<super::error::BoxError> + Send + Sync,
    Request: Send + 'static,
{
    type Service = Batch<S, Request>;

    fn layer(&self, service: S) -> Self::Service {
        Batch::new(service, self.max_items, self.max_latency, self.bound)
    }
}

impl<Request> fmt::Debug for BatchLayer<Request> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLayer")
            .field("max_items", &self.max_items)
            .field("max_latency", &self.max_latency)
            .field("bound", &self.bound)
            .finish()
    }
}

impl<Request> Clone for BatchLayer<Request> {
    fn clone(&self) -> Self {
        BatchLayer {
            max_items: self.max_items,
            max_latency: self.max_latency,
            bound: self.bound,
            _p: PhantomData,
        }
    }
}
