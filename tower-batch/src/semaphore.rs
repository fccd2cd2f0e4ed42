//! A semaphore that can be closed, unlike `tokio::sync::Semaphore` alone.
//!
//! `Batch` hands one permit to every caller so the number of in-flight
//! requests is bounded by the channel's capacity; closing it lets the
//! worker wake every pending acquire with `None` once it shuts down,
//! rather than leaving callers parked forever.

use futures_core::ready;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore as TokioSemaphore};

#[derive(Debug, Clone)]
pub(crate) struct Semaphore {
    inner: Option<Arc<TokioSemaphore>>,
}

#[derive(Debug)]
pub(crate) enum Permit {
    Acquired(OwnedSemaphorePermit),
    NoLimit,
}

pub(crate) enum Acquire {
    Waiting(
        Pin<Box<dyn Future<Output = Result<OwnedSemaphorePermit, tokio::sync::AcquireError>> + Send>>,
    ),
    NoLimit,
}

impl Semaphore {
    /// A semaphore with `bound` concurrent outstanding requests, or no limit
    /// at all when `bound` is `None` (every request is admitted immediately).
    pub(crate) fn new_with_permits(bound: Option<usize>) -> Self {
        Semaphore {
            inner: bound.map(|n| Arc::new(TokioSemaphore::new(n))),
        }
    }

    pub(crate) fn acquire(&self) -> Acquire {
        match &self.inner {
            Some(semaphore) => {
                let semaphore = semaphore.clone();
                Acquire::Waiting(Box::pin(async move { semaphore.acquire_owned().await }))
            }
            None => Acquire::NoLimit,
        }
    }

    /// Closes the semaphore, so every pending and future `acquire` resolves
    /// to `None` instead of blocking.
    pub(crate) fn close(&self) {
        if let Some(semaphore) = &self.inner {
            semaphore.close();
        }
    }
}

impl Future for Acquire {
    type Output = Option<Permit>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self {
            Acquire::NoLimit => Poll::Ready(Some(Permit::NoLimit)),
            Acquire::Waiting(fut) => match ready!(fut.as_mut().poll(cx)) {
                Ok(permit) => Poll::Ready(Some(Permit::Acquired(permit))),
                Err(_closed) => Poll::Ready(None),
            },
        }
    }
}
