use crate::{Error, Result};
use core::{fmt, future::Future, time::Duration};
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};

/// A dedicated multi-threaded Tokio runtime that owns one role of the
/// pipeline (the publisher or the subscriber's workers).
///
/// Worker threads are named `<name>-<n>`. Dropping a scheduler shuts its
/// runtime down in the background; [`Scheduler::dispose`] waits for it
/// instead.
pub struct Scheduler {
    name: String,
    threads: usize,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Scheduler {
    /// Builds a runtime with `threads` worker threads.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `threads` is zero.
    /// - [`Error::Scheduler`] if the runtime cannot be built.
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self> {
        let name = name.into();
        if threads == 0 {
            return Err(Error::InvalidConfig {
                reason: format!("scheduler `{name}` needs at least one thread"),
            });
        }

        let prefix = name.clone();
        let next_thread = Arc::new(AtomicUsize::new(0));
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name_fn(move || {
                format!("{prefix}-{}", next_thread.fetch_add(1, Ordering::Relaxed))
            })
            .enable_time()
            .build()
            .map_err(|e| Error::Scheduler {
                context: format!("failed to build `{name}` runtime: {e}"),
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Scheduler `{name}` started with {threads} threads");

        Ok(Self {
            name,
            threads,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn threads(&self) -> usize {
        self.threads
    }

    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs `future` to completion on this runtime, blocking the calling
    /// thread. Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Shuts the runtime down, waiting up to `timeout` for its tasks to stop.
    ///
    /// Must be called from outside any runtime.
    pub fn dispose(mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);

            #[cfg(feature = "tracing")]
            tracing::debug!("Scheduler `{}` disposed", self.name);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .field("running", &self.runtime.is_some())
            .finish()
    }
}
