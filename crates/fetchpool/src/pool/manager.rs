use super::worker::{JobQueue, worker_loop};
use crate::{Error, Fetch, FetchResult, HttpFetcher, Job, JobId, Result};
use core::time::Duration;
use std::{collections::HashSet, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Sizing and shutdown settings for a [`FetchPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker tasks, and therefore the maximum number of fetches in
    /// flight at any moment.
    pub worker_count: usize,
    /// How long to wait for each worker to exit after it is signalled.
    pub shutdown_timeout: Duration,
}

impl PoolConfig {
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

    pub const fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }
}

/// Pool-side handle to one worker task.
struct WorkerHandle {
    worker_id: usize,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// A bounded pool of asynchronous workers that executes one batch of
/// [`Job`]s.
///
/// Workers are spawned on construction and immediately wait on a shared job
/// queue. [`FetchPool::run`] submits the batch, waits for one
/// [`FetchResult`] per job, signals every worker individually and joins them
/// before returning.
///
/// At most `worker_count` fetches are in flight at any time, whatever the size
/// of the batch.
///
/// Dropping a pool without running it cancels every worker.
pub struct FetchPool {
    jobs: Vec<Job>,
    job_tx: mpsc::Sender<Job>,
    result_rx: mpsc::Receiver<FetchResult>,
    workers: Vec<WorkerHandle>,
    shutdown_timeout: Duration,
    _shutdown_guard: DropGuard,
}

impl FetchPool {
    /// Creates a pool of `worker_count` workers for `jobs`, using `fetcher`
    /// for every request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `jobs` is empty,
    /// `worker_count` is zero, or two jobs share an identity.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime, since workers are spawned
    /// immediately.
    pub fn new<F: Fetch>(jobs: Vec<Job>, worker_count: usize, fetcher: F) -> Result<Self> {
        Self::with_config(jobs, PoolConfig::new(worker_count), fetcher)
    }

    /// Creates a pool that fetches over HTTP with [`HttpFetcher::new`].
    ///
    /// # Errors
    ///
    /// See [`FetchPool::new`]. Also fails if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// See [`FetchPool::new`].
    pub fn http(jobs: Vec<Job>, worker_count: usize) -> Result<Self> {
        Self::new(jobs, worker_count, HttpFetcher::new()?)
    }

    /// Creates a pool from an explicit [`PoolConfig`].
    ///
    /// Both the job channel and the result channel are bounded by the batch
    /// length, so submitting the batch never waits on the workers and workers
    /// never wait on the collector.
    ///
    /// # Errors
    ///
    /// See [`FetchPool::new`].
    ///
    /// # Panics
    ///
    /// See [`FetchPool::new`].
    pub fn with_config<F: Fetch>(jobs: Vec<Job>, config: PoolConfig, fetcher: F) -> Result<Self> {
        validate(&jobs, &config)?;

        let capacity = jobs.len();
        let (job_tx, job_rx) = mpsc::channel(capacity);
        let (result_tx, result_rx) = mpsc::channel(capacity);
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));
        let fetcher = Arc::new(fetcher);
        let shutdown_token = CancellationToken::new();

        let workers = (0..config.worker_count)
            .map(|worker_id| {
                let shutdown = shutdown_token.child_token();
                let task = tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&queue),
                    result_tx.clone(),
                    Arc::clone(&fetcher),
                    shutdown.clone(),
                ));
                WorkerHandle {
                    worker_id,
                    shutdown,
                    task,
                }
            })
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Started {} workers for a batch of {} jobs",
            config.worker_count,
            capacity
        );

        // Only workers hold result senders, so the channel closes once every
        // worker has exited.
        drop(result_tx);

        Ok(Self {
            jobs,
            job_tx,
            result_rx,
            workers,
            shutdown_timeout: config.shutdown_timeout,
            _shutdown_guard: shutdown_token.drop_guard(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of jobs in the batch.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Always `false` for a constructed pool; present for API symmetry with
    /// [`FetchPool::len`].
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs the batch to completion and returns one result per job.
    ///
    /// Results arrive in completion order, not submission order; correlate
    /// them with [`FetchResult::id`]. Individual job failures are carried in
    /// their results and never abort the batch.
    ///
    /// Workers are signalled only after every expected result has been
    /// received, and all of them have exited by the time this returns.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(jobs = self.jobs.len(), workers = self.workers.len())))]
    pub async fn run(self) -> Vec<FetchResult> {
        let Self {
            jobs,
            job_tx,
            mut result_rx,
            workers,
            shutdown_timeout,
            _shutdown_guard,
        } = self;

        let pending: HashSet<JobId> = jobs.iter().map(Job::id).collect();

        // === Phase 1: Submit the whole batch ===
        for job in jobs {
            // Capacity equals the batch length, so this can only fail once every
            // worker is gone. The job is then reported as lost below.
            if let Err(_e) = job_tx.try_send(job) {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to submit job: {_e}");
            }
        }

        // === Phase 2: Collect until every job has a result ===
        let results = collect_results(&mut result_rx, pending).await;

        // === Phase 3: Signal and join every worker ===
        drop(job_tx);
        shutdown_workers(workers, shutdown_timeout).await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Batch complete with {} results", results.len());

        results
    }
}

/// Receives one result per identity in `pending`. Results for identities that
/// are not pending are discarded. If the channel closes first, every identity
/// still pending gets [`Error::WorkerLost`].
async fn collect_results(
    result_rx: &mut mpsc::Receiver<FetchResult>,
    mut pending: HashSet<JobId>,
) -> Vec<FetchResult> {
    let expected = pending.len();
    let mut results = Vec::with_capacity(expected);

    while !pending.is_empty() {
        let Some(result) = result_rx.recv().await else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Result channel closed with {} jobs outstanding",
                pending.len()
            );
            break;
        };

        if pending.remove(&result.id()) {
            results.push(result);
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!("Discarding unexpected result for job {}", result.id());
        }
    }

    results.extend(
        pending
            .into_iter()
            .map(|id| FetchResult::failed(id, Error::WorkerLost)),
    );
    debug_assert_eq!(results.len(), expected);
    results
}

fn validate(jobs: &[Job], config: &PoolConfig) -> Result<()> {
    if jobs.is_empty() {
        return Err(Error::invalid("batch must contain at least one job"));
    }

    if config.worker_count == 0 {
        return Err(Error::invalid("worker count must be at least 1"));
    }

    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(job.id()) {
            return Err(Error::invalid(format!(
                "duplicate job identity {}",
                job.id()
            )));
        }
    }

    Ok(())
}

/// Signals each worker through its own token, then waits (up to
/// `shutdown_timeout` per worker) for every task to exit. A worker that does
/// not exit in time is aborted and awaited, so no task outlives this call.
///
/// Workers only observe their token between jobs, so the timeout matters only
/// when a fetch is still running at shutdown.
async fn shutdown_workers(workers: Vec<WorkerHandle>, shutdown_timeout: Duration) {
    #[cfg(feature = "tracing")]
    tracing::debug!("Notifying {} workers to shut down", workers.len());

    for worker in &workers {
        worker.shutdown.cancel();
    }

    let joins = workers.into_iter().map(
        |WorkerHandle {
             worker_id: _worker_id,
             mut task,
             ..
         }| async move {
            match timeout(shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_worker_id} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_worker_id} terminated abnormally: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_worker_id} shutdown timed out, aborting");
                    task.abort();
                    // Resolves once the task has actually been torn down.
                    let _ = task.await;
                }
            }
        },
    );

    futures::future::join_all(joins).await;
}
