//! Tokio runtime wrapper shared by the sieve binaries.
//!
//! The runtime owns one [`CancellationToken`]. Binaries cancel it on Ctrl-C;
//! [`SieveRuntime::run_until_cancelled`] then abandons the in-flight work.
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SieveHandle {
    inner: Handle,
    cancel: CancellationToken,
}

pub struct SieveRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl SieveRuntime {
    /// Build a multi-threaded runtime with IO and timers enabled.
    ///
    /// ```
    /// use sieve_runtime::SieveRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = SieveRuntime::build("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// let value = runtime.block_on(async { 2 + 2 });
    /// assert_eq!(value, 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);

        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }

        let runtime = builder.build()?;
        Ok(Self {
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> SieveHandle {
        SieveHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Run `fut` to completion unless the shared token is cancelled first.
    ///
    /// ```
    /// use sieve_runtime::SieveRuntime;
    ///
    /// let runtime = SieveRuntime::build("cancel-doctest", Some(1)).unwrap();
    /// assert_eq!(runtime.run_until_cancelled(async { 7 }), Some(7));
    ///
    /// runtime.handle().cancellation().cancel();
    /// let never = std::future::pending::<()>();
    /// assert_eq!(runtime.run_until_cancelled(never), None);
    /// ```
    pub fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        let cancel = self.cancel.clone();
        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("runtime.cancelled");
                    None
                }
                out = fut => Some(out),
            }
        })
    }

    /// Cancel the shared token when the process receives Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) {
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    /// Cancel outstanding work and shut the runtime down, waiting at most `graceful`.
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl SieveHandle {
    /// Spawn a future onto the shared runtime.
    ///
    /// ```
    /// use sieve_runtime::SieveRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = SieveRuntime::build("handle-doctest", Some(1)).unwrap();
    /// let task = runtime.handle().spawn(async { 21 * 2 });
    /// let result = runtime.block_on(async move { task.await.unwrap() });
    /// assert_eq!(result, 42);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
