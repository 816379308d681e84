use super::{RunContext, pool::WorkRequest};
use crate::{Delivery, Error, Outcome};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tokio::sync::mpsc;

/// Worker task that checks delivered items until told to shut down.
///
/// Checks arriving after the run was cancelled are skipped, but flush and
/// shutdown requests are always acknowledged.
pub(super) async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    context: Arc<RunContext>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Check(delivery) => {
                if context.cancel.is_cancelled() {
                    continue;
                }
                check_delivery(worker_id, &context, delivery);
            }
            WorkRequest::Flush { response } => {
                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} flush acknowledgement dropped");
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

/// Evaluates one item, records its outcome, hands it to the sink and
/// settles its demand. A panic in either the check or the sink fails the run.
///
/// The check runs in `block_in_place`: it is CPU bound and a memoized checker
/// may park on a peer's computation.
#[allow(clippy::used_underscore_binding)]
fn check_delivery(_worker_id: usize, context: &RunContext, delivery: Delivery) {
    let candidate = delivery.item.value;
    let evaluated = tokio::task::block_in_place(|| {
        catch_unwind(AssertUnwindSafe(|| context.checker.evaluate(candidate)))
    });

    let verdict = match evaluated {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            context.fail(e);
            return;
        }
        Err(panic) => {
            context.fail(Error::Computation {
                reason: format!("check of {candidate} panicked: {}", panic_message(&*panic)),
            });
            return;
        }
    };

    #[cfg(feature = "tracing")]
    tracing::trace!(
        "Worker {_worker_id} checked #{} = {candidate}: factor {}",
        delivery.item.sequence,
        verdict.factor
    );

    let outcome = Outcome {
        item: delivery.item,
        factor: verdict.factor,
        from_cache: verdict.from_cache,
    };
    context.record(outcome);

    if let Some(sink) = context.sink() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| sink(&outcome))) {
            context.fail(Error::Computation {
                reason: format!(
                    "sink panicked on #{}: {}",
                    outcome.item.sequence,
                    panic_message(&*panic)
                ),
            });
            return;
        }
    }

    if delivery.claimed {
        if let Err(e) = context.demand.consume(1) {
            context.fail(e);
            return;
        }
        context.demand.replenish();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
