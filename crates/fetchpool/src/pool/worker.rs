use crate::{Error, Fetch, FetchResponse, FetchResult, Job, Result};
use bytes::Bytes;
use core::panic::AssertUnwindSafe;
use futures::FutureExt;
use std::{any::Any, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Receiving end of the job channel, shared by every worker of a pool.
///
/// The mutex only serialises the dequeue. It is released as soon as a job is
/// taken and is never held while a job executes.
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Worker task responsible for executing [`Job`]s.
///
/// The worker waits for either the next job or its own shutdown signal, with
/// no priority between the two. Each job is executed to completion and yields
/// exactly one [`FetchResult`] on `results` before the worker waits again.
///
/// This function is designed to be spawned as a Tokio task and runs until one
/// of the following happens:
///
/// - `shutdown` is cancelled by the pool.
/// - The job channel is closed and drained.
/// - The result channel is closed (the pool is gone).
///
/// # Arguments
///
/// - `worker_id`: Index of this worker within its pool (used for
///   logs/tracing).
/// - `jobs`: Shared job queue.
/// - `results`: Sender for completed results.
/// - `fetcher`: The fetch capability shared by all workers.
/// - `shutdown`: This worker's own termination signal.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub(crate) async fn worker_loop<F: Fetch>(
    worker_id: usize,
    jobs: JobQueue,
    results: mpsc::Sender<FetchResult>,
    fetcher: Arc<F>,
    shutdown: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        let job = tokio::select! {
            job = next_job(&jobs) => match job {
                Some(job) => job,
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} found the job channel closed");
                    break;
                }
            },
            () = shutdown.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break;
            }
        };

        let result = execute_job(worker_id, fetcher.as_ref(), job).await;

        if let Err(_e) = results.send(result).await {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {worker_id} failed to publish result: {_e}");
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

async fn next_job(jobs: &Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    jobs.lock().await.recv().await
}

/// Executes a single job and turns every outcome into a [`FetchResult`].
///
/// A transport failure short-circuits before any response is touched. A body
/// that cannot be read, or a panic inside the fetch capability, is likewise
/// captured as that job's failure.
#[allow(clippy::used_underscore_binding)]
pub(crate) async fn execute_job<F: Fetch>(_worker_id: usize, fetcher: &F, job: Job) -> FetchResult {
    let id = job.id();

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} executing job {id}: {} {}", job.method(), job.target());

    match AssertUnwindSafe(fetch_full(fetcher, &job)).catch_unwind().await {
        Ok(Ok((status, body))) => FetchResult::success(id, status, body),
        Ok(Err(e)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} job {id} failed: {e}");
            FetchResult::failed(id, e)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {_worker_id} job {id} panicked: {reason}");
            FetchResult::failed(id, Error::Panicked { reason })
        }
    }
}

async fn fetch_full<F: Fetch>(fetcher: &F, job: &Job) -> Result<(u16, Bytes)> {
    let response = fetcher.fetch(job.target(), job.method()).await?;
    let status = response.status();
    let body = response.body().await?;
    Ok((status, body))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
