//! The future `Batch::call` returns: a oneshot receiver awaiting the
//! worker's response, mapped into a plain `Result<Response, ServiceError>`.

use super::{error::ServiceError, message};
use futures_core::ready;
use pin_project::pin_project;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// Future that completes when the batch worker has processed a request
/// submitted through [`Batch`](super::service::Batch).
#[pin_project]
#[derive(Debug)]
pub struct ResponseFuture<Fut> {
    #[pin]
    state: ResponseState<Fut>,
}

#[pin_project(project = ResponseStateProj)]
#[derive(Debug)]
enum ResponseState<Fut> {
    Failed(Option<ServiceError>),
    Rx(#[pin] message::Rx<Fut>),
    Poll(#[pin] Fut),
}

impl<Fut> ResponseFuture<Fut> {
    pub(crate) fn new(rx: message::Rx<Fut>) -> Self {
        ResponseFuture {
            state: ResponseState::Rx(rx),
        }
    }

    pub(crate) fn failed(err: ServiceError) -> Self {
        ResponseFuture {
            state: ResponseState::Failed(Some(err)),
        }
    }
}

impl<F, T, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<T, E>>,
    E: Into<super::error::BoxError>,
{
    type Output = Result<T, ServiceError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match this.state.as_mut().project() {
                ResponseStateProj::Failed(e) => {
                    return Poll::Ready(Err(e.take().expect("polled after completion")))
                }
                ResponseStateProj::Rx(rx) => {
                    let fut = match ready!(rx.poll(cx)) {
                        Ok(Ok(fut)) => fut,
                        Ok(Err(e)) => return Poll::Ready(Err(e)),
                        Err(_) => {
                            return Poll::Ready(Err(ServiceError::new(
                                "batch worker dropped the response channel".into(),
                            )))
                        }
                    };
                    this.state.set(ResponseState::Poll(fut));
                }
                ResponseStateProj::Poll(fut) => {
                    return Poll::Ready(ready!(fut.poll(cx)).map_err(|e| ServiceError::new(e.into())));
                }
            }
        }
    }
}
