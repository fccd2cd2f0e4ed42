//! Error types for the batch middleware.

use std::{fmt, sync::Arc};

/// An error produced by a `Batch` service that has been padded to track its
/// source across the worker's boundary.
///
/// An `Arc` around the underlying error lets every waiting caller observe
/// the same failure when the batch worker goes down, without requiring the
/// error type to be `Clone`.
#[derive(Debug, Clone)]
pub struct ServiceError {
    inner: Arc<BoxError>,
}

/// An error returned when the batch worker has stopped processing requests,
/// either because it finished (all `Batch` clones were dropped) or because
/// the inner service errored and poisoned the worker.
#[derive(Debug)]
pub struct Closed {
    _p: (),
}

/// A boxed standard error, the common currency errors cross module
/// boundaries in.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl ServiceError {
    pub(crate) fn new(inner: BoxError) -> ServiceError {
        ServiceError {
            inner: Arc::new(inner),
        }
    }

    /// Used internally to clone the error `Arc` back out to another
    /// awaiting task.
    pub(crate) fn clone_inner(&self) -> ServiceError {
        ServiceError {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch worker failed: {}", self.inner)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.inner)
    }
}

impl Closed {
    pub(crate) fn new() -> Closed {
        Closed { _p: () }
    }
}

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("batch worker closed")
    }
}

impl std::error::Error for Closed {}
