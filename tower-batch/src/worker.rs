//! The background task that drains queued requests into the inner service,
//! forwarding each as a `BatchControl::Item` and periodically forcing a
//! `BatchControl::Flush` so the inner batch verifier never sits on a
//! half-full batch longer than `max_latency`.

use super::{error::ServiceError, message::Message, semaphore::Semaphore, BatchControl};
use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tower::{Service, ServiceExt};
use tracing::Instrument;

pub(crate) struct Worker<S, Request>
where
    S: Service<BatchControl<Request>>,
{
    service: S,
    rx: mpsc::Receiver<Message<Request, S::Future>>,
    max_items: usize,
    max_latency: Duration,
    semaphore: Semaphore,
    error: Arc<Mutex<Option<ServiceError>>>,
}

impl<S, Request> Worker<S, Request>
where
    S: Service<BatchControl<Request>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<super::error::BoxError> + Send + Sync + 'static,
    Request: Send + 'static,
{
    pub(crate) fn new(
        service: S,
        rx: mpsc::Receiver<Message<Request, S::Future>>,
        max_items: usize,
        max_latency: Duration,
        semaphore: Semaphore,
        error: Arc<Mutex<Option<ServiceError>>>,
    ) -> Self {
        Worker {
            service,
            rx,
            max_items,
            max_latency,
            semaphore,
            error,
        }
    }

    fn fail(&mut self, error: super::error::BoxError) {
        tracing::error!(%error, "batch worker's inner service failed, closing");
        let error = ServiceError::new(error);
        *self.error.lock().expect("poisoned error lock") = Some(error);
        self.rx.close();
        self.semaphore.close();
    }

    /// Drives the inner service to readiness, calls it with `req`, and
    /// spawns a task that forwards the response to `reply_to` (or, for a
    /// bare flush with nobody waiting, just drives it to completion).
    async fn forward(&mut self, req: BatchControl<Request>, reply_to: Option<super::message::Tx<S::Future>>) {
        let ready = match self.service.ready().await {
            Ok(service) => service,
            Err(e) => {
                self.fail(e.into());
                return;
            }
        };

        let future = ready.call(req);

        match reply_to {
            Some(tx) => {
                tokio::spawn(async move {
                    let _ = tx.send(Ok(future));
                });
            }
            None => {
                tokio::spawn(async move {
                    let _ = future.await;
                });
            }
        }
    }

    async fn flush(&mut self) {
        self.forward(BatchControl::Flush, None).await;
    }

    /// Runs until every `Batch` handle is dropped (the channel closes) or
    /// the inner service fails, at which point every still-queued and
    /// future caller observes the same terminal error.
    pub(crate) async fn run(mut self) {
        let mut batch_size = 0usize;
        let mut deadline: Option<Pin<Box<Sleep>>> = None;

        loop {
            let msg = match deadline.as_mut() {
                Some(d) => {
                    tokio::select! {
                        biased;
                        _ = d.as_mut() => {
                            self.flush().await;
                            batch_size = 0;
                            deadline = None;
                            continue;
                        }
                        msg = self.rx.recv() => msg,
                    }
                }
                None => self.rx.recv().await,
            };

            match msg {
                Some(msg) => {
                    let span = msg.span.clone();
                    self.forward(BatchControl::Item(msg.request), Some(msg.tx))
                        .instrument(span)
                        .await;
                    batch_size += 1;
                    if batch_size >= self.max_items {
                        self.flush().await;
                        batch_size = 0;
                        deadline = None;
                    } else if deadline.is_none() {
                        deadline = Some(Box::pin(sleep(self.max_latency)));
                    }
                }
                None => break,
            }
        }

        // Drain: give the final partial batch a chance to flush before the
        // worker exits, so in-flight callers aren't left hanging.
        if batch_size > 0 {
            self.flush().await;
        }
    }
}
