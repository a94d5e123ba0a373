use crate::error::InvokeError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::task::JoinHandle;

/// Single-value asynchronous result of a deferred call.
///
/// Resolves exactly once and can be awaited on any executor.
pub type Deferred<T, E> = BoxFuture<'static, Result<T, E>>;

/// Dedicated tokio runtime that drives every request of a client.
///
/// Callers never need a runtime of their own: blocking calls park the calling
/// thread while the runtime does the work, and deferred calls return a future
/// that only waits on a join handle. Clones share one runtime; the last drop
/// shuts it down without blocking, so it may be dropped inside async code.
#[derive(Clone)]
pub struct ClientRuntime {
    inner: Arc<Owned>,
}

struct Owned {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl Drop for Owned {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl ClientRuntime {
    /// # Errors
    /// Returns the I/O error reported by tokio if worker threads cannot be started.
    pub fn new(worker_threads: usize, thread_name: &str) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(thread_name)
            .enable_all()
            .build()?;
        tracing::debug!(
            worker_threads = worker_threads.max(1),
            thread_name,
            "client runtime started"
        );
        let handle = runtime.handle().clone();
        Ok(Self {
            inner: Arc::new(Owned {
                runtime: Some(runtime),
                handle,
            }),
        })
    }

    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// Enter the runtime context, e.g. to build a client whose constructor spawns tasks
    pub fn enter(&self) -> tokio::runtime::EnterGuard<'_> {
        self.inner.handle.enter()
    }

    /// Run `fut` on the runtime and wait for it on the current thread.
    ///
    /// Safe from plain threads and from inside any tokio runtime: on a
    /// multi-thread worker the wait goes through `block_in_place`.
    ///
    /// # Errors
    /// Returns the future's error, or `InvokeError::RuntimeShutdown` if the
    /// runtime stopped first.
    pub fn block_on<T, F>(&self, fut: F) -> Result<T, InvokeError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, InvokeError>> + Send + 'static,
    {
        let task = self.inner.handle.spawn(fut);
        let joined = match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| futures::executor::block_on(task))
            }
            _ => futures::executor::block_on(task),
        };
        flatten(joined)
    }

    /// Schedule `fut` on the runtime and return a handle to its result.
    ///
    /// The returned future keeps the runtime alive until it completes.
    pub fn spawn<T, F>(&self, fut: F) -> Deferred<T, InvokeError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, InvokeError>> + Send + 'static,
    {
        let task: JoinHandle<Result<T, InvokeError>> = self.inner.handle.spawn(fut);
        let keep_alive = self.clone();
        Box::pin(async move {
            let joined = task.await;
            drop(keep_alive);
            flatten(joined)
        })
    }
}

fn flatten<T>(
    joined: Result<Result<T, InvokeError>, tokio::task::JoinError>,
) -> Result<T, InvokeError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(InvokeError::RuntimeShutdown),
    }
}
