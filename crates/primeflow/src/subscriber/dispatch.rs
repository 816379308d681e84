use super::{
    PipelineState, RunContext,
    pool::{WorkRequest, WorkerPool},
};
use crate::{Error, Signal};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Drains a connected sequence into the worker pool.
///
/// Items are handed out in emission order. The run settles when the
/// publisher signals a terminal state, when a worker fails, or when the
/// subscriber is cancelled.
pub(super) async fn dispatch(
    mut signals: mpsc::UnboundedReceiver<Signal>,
    pool: Arc<WorkerPool>,
    context: Arc<RunContext>,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = context.cancel.cancelled() => return,
            signal = signals.recv() => signal,
        };

        match signal {
            Some(Signal::Next(delivery)) => {
                if let Err(e) = pool.send_to_next_worker(WorkRequest::Check(delivery)).await {
                    context.fail(e);
                    return;
                }
            }
            Some(Signal::Complete(stats)) => {
                context.set_emitted(stats);
                match pool.drain().await {
                    Ok(()) => context.settle(PipelineState::Completed, None),
                    Err(e) => context.fail(e),
                }
                return;
            }
            Some(Signal::Error(e)) => {
                context.fail(e);
                return;
            }
            Some(Signal::Cancelled) => {
                context.settle(PipelineState::Cancelled, None);
                return;
            }
            None => {
                context.fail(Error::ChannelError {
                    context: "sequence closed without a terminal signal".to_string(),
                });
                return;
            }
        }
    }
}
