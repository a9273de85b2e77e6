//! Named worker threads for projection.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver};
use tracing::debug;

use crate::context::CancellationToken;
use crate::error::{FedError, FedResult};

/// A fixed set of threads draining one bounded queue.
///
/// Workers stop when the queue disconnects or the query is cancelled. The
/// pool is not joined on drop; every exit path is driven by a channel.
pub(crate) struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `workers` threads, each running `job` on every item it dequeues.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a thread cannot be spawned.
    pub(crate) fn start<T, F>(
        name: &str,
        workers: usize,
        rx: &Receiver<T>,
        cancellation: &CancellationToken,
        job: F,
    ) -> FedResult<Self>
    where
        T: Send + 'static,
        F: Fn(T) -> bool + Send + Clone + 'static,
    {
        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx = rx.clone();
            let cancellation = cancellation.clone();
            let job = job.clone();
            let thread_name = format!("fedql-{name}-{idx}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    loop {
                        select! {
                            recv(rx) -> msg => match msg {
                                Ok(item) => {
                                    if cancellation.is_cancelled() || !job(item) {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                            recv(cancellation.signal()) -> _ => break,
                        }
                    }
                    debug!(worker = %thread_name, "projection worker stopped");
                })
                .map_err(|e| FedError::internal(format!("failed to spawn {name} worker: {e}")))?;
            handles.push(handle);
        }
        Ok(Self { workers: handles })
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }
}
