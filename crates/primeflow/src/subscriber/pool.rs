//! Round-robin pool of prime-checking workers.
//!
//! Each worker owns a bounded [`mpsc::Receiver`] and processes requests in the
//! order they were sent. The pool relies on that ordering: a
//! [`WorkRequest::Flush`] acknowledged by every worker proves that all checks
//! sent before it have finished.

use super::{RunContext, worker::worker_loop};
use crate::{Delivery, Error, Result, Scheduler};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A message handled by a worker task.
#[derive(Debug)]
pub(super) enum WorkRequest {
    /// Check one delivered item.
    Check(Delivery),
    /// Acknowledge once every earlier request has been handled.
    Flush { response: oneshot::Sender<()> },
    /// Acknowledge and stop.
    Shutdown { response: oneshot::Sender<()> },
}

pub(super) struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    /// Spawns `size` workers on `scheduler`, each with a channel of
    /// `buffer` requests.
    pub(super) fn spawn(
        scheduler: &Scheduler,
        context: &Arc<RunContext>,
        size: usize,
        buffer: usize,
    ) -> Self {
        let workers = (0..size)
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(buffer);
                scheduler.spawn(worker_loop(worker_id, rx, Arc::clone(context)));
                tx
            })
            .collect();

        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token: context.cancel.clone(),
        }
    }

    fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Sends a [`WorkRequest`] to the next worker in round-robin order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the pool is shutting down or the
    /// worker's channel is closed.
    pub(super) async fn send_to_next_worker(&self, request: WorkRequest) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ChannelError {
                context: "worker pool is shutting down".to_string(),
            });
        }

        let worker_idx = self.next_worker_index();
        self.workers[worker_idx]
            .send(request)
            .await
            .map_err(|_| Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            })
    }

    /// Waits until every worker has handled all requests sent so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if a worker went away before
    /// acknowledging.
    pub(super) async fn drain(&self) -> Result<()> {
        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            worker
                .send(WorkRequest::Flush { response: tx })
                .await
                .map_err(|_| Error::ChannelError {
                    context: format!("Worker {i} channel closed before flush"),
                })?;
            acks.push((i, rx));
        }

        for (i, rx) in acks {
            rx.await.map_err(|_| Error::ChannelError {
                context: format!("Worker {i} dropped its flush acknowledgement"),
            })?;
        }
        Ok(())
    }

    /// Cancels remaining work, asks every worker to stop and waits up to
    /// `shutdown_timeout` for each acknowledgement.
    pub(super) async fn shutdown(&self, shutdown_timeout: Duration) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        let mut shutdown_handles = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            match timeout(shutdown_timeout, worker.send(WorkRequest::Shutdown { response: tx })).await {
                Ok(Ok(())) => shutdown_handles.push((i, rx)),
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {i} already stopped: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Timed out sending shutdown to worker {i}");
                }
            }
        }

        let acknowledgements = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(shutdown_timeout, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });
        futures::future::join_all(acknowledgements).await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");
    }
}
