use crate::{Error, Fetch, FetchPool, FetchResponse, FetchResult, Job, JobId, PoolConfig, Result};
use bytes::Bytes;
use core::{future::Future, time::Duration};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use reqwest::{Method, Url};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::time::{Instant, sleep};

/// Counters shared by a [`StubFetcher`] and the responses it hands out.
#[derive(Default)]
struct Stats {
    calls: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
    closed: AtomicBool,
    calls_after_close: AtomicUsize,
}

impl Stats {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.calls_after_close.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory fetch capability.
///
/// Targets look like `http://stub.test/jobs/<id>`. Every fetch sleeps for
/// `delay` and answers `200 ok-<id>` unless the job is listed in one of the
/// failure sets.
#[derive(Default)]
struct StubFetcher {
    delay: Duration,
    fail_transport: HashSet<JobId>,
    fail_read: HashSet<JobId>,
    panic_on: HashSet<JobId>,
    stats: Arc<Stats>,
}

impl StubFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

struct StubResponse {
    id: JobId,
    target: String,
    fail_read: bool,
    stats: Arc<Stats>,
}

impl Fetch for StubFetcher {
    type Response = StubResponse;

    fn fetch(
        &self,
        target: &Url,
        _method: &Method,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        let id = job_id(target);
        let delay = self.delay;
        let fail_transport = self.fail_transport.contains(&id);
        let fail_read = self.fail_read.contains(&id);
        let explode = self.panic_on.contains(&id);
        let stats = Arc::clone(&self.stats);
        let target = target.to_string();

        async move {
            stats.enter();
            sleep(delay).await;

            if explode {
                stats.leave();
                panic!("stub exploded on job {id}");
            }
            if fail_transport {
                stats.leave();
                return Err(Error::transport(target, "simulated timeout"));
            }

            Ok(StubResponse {
                id,
                target,
                fail_read,
                stats,
            })
        }
    }
}

impl FetchResponse for StubResponse {
    fn status(&self) -> u16 {
        200
    }

    fn body(self) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            self.stats.leave();
            if self.fail_read {
                Err(Error::read(self.target, "simulated truncated body"))
            } else {
                Ok(Bytes::from(format!("ok-{}", self.id)))
            }
        }
    }
}

fn job_id(target: &Url) -> JobId {
    target
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.parse().ok())
        .expect("stub targets end with a job id")
}

fn batch(ids: impl IntoIterator<Item = JobId>) -> Vec<Job> {
    ids.into_iter()
        .map(|id| Job::get(id, &format!("http://stub.test/jobs/{id}")).unwrap())
        .collect()
}

fn by_id(results: Vec<FetchResult>) -> HashMap<JobId, FetchResult> {
    let len = results.len();
    let map: HashMap<_, _> = results.into_iter().map(|r| (r.id(), r)).collect();
    assert_eq!(map.len(), len, "duplicate result identities");
    map
}

#[tokio::test(start_paused = true)]
async fn four_jobs_on_two_workers_take_two_rounds() {
    let fetcher = StubFetcher::with_delay(Duration::from_millis(10));
    let pool = FetchPool::new(batch(0..4), 2, fetcher).unwrap();

    let start = Instant::now();
    let results = pool.run().await;
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(20) && elapsed < Duration::from_millis(30),
        "took {elapsed:?}"
    );

    let results = by_id(results);
    assert_eq!(results.len(), 4);
    for id in 0..4 {
        let result = &results[&id];
        assert_eq!(result.status(), Some(200));
        assert_eq!(result.body_text().as_deref(), Some(format!("ok-{id}").as_str()));
        assert!(result.failure().is_none());
    }
}

#[tokio::test]
async fn transport_failure_is_isolated_to_its_job() {
    let fetcher = StubFetcher {
        fail_transport: HashSet::from([1]),
        ..StubFetcher::default()
    };
    let results = by_id(FetchPool::new(batch(0..3), 2, fetcher).unwrap().run().await);

    assert_eq!(results.len(), 3);
    for id in [0, 2] {
        assert_eq!(results[&id].status(), Some(200));
        assert!(results[&id].failure().is_none());
    }
    assert_eq!(results[&1].status(), None);
    assert!(matches!(
        results[&1].failure(),
        Some(Error::Transport { reason, .. }) if reason == "simulated timeout"
    ));
}

#[tokio::test]
async fn read_and_panic_failures_do_not_stop_the_batch() {
    let fetcher = StubFetcher {
        fail_read: HashSet::from([3]),
        panic_on: HashSet::from([5]),
        ..StubFetcher::default()
    };
    let results = by_id(FetchPool::new(batch(0..8), 3, fetcher).unwrap().run().await);

    assert_eq!(results.len(), 8);
    assert!(matches!(results[&3].failure(), Some(Error::Read { .. })));
    assert!(matches!(
        results[&5].failure(),
        Some(Error::Panicked { reason }) if reason.contains("job 5")
    ));
    let succeeded = results.values().filter(|r| r.is_success()).count();
    assert_eq!(succeeded, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_job_gets_exactly_one_result() {
    for num_jobs in [1_u64, 2, 7, 32, 100] {
        for workers in [1, 2, 3, 8, 16] {
            let fetcher = StubFetcher::with_delay(Duration::from_micros(100));
            let pool = FetchPool::new(batch(0..num_jobs), workers, fetcher).unwrap();
            let results = pool.run().await;

            assert_eq!(
                results.len(),
                num_jobs as usize,
                "jobs={num_jobs} workers={workers}"
            );
            let ids: HashSet<JobId> = results.iter().map(FetchResult::id).collect();
            assert_eq!(ids, (0..num_jobs).collect::<HashSet<_>>());
            assert!(results.iter().all(FetchResult::is_success));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_are_correlated_by_identity_not_order() {
    // Sparse, unordered identities.
    let ids = [42_u64, 7, 1_000, 3, 99];
    let fetcher = StubFetcher::with_delay(Duration::from_millis(1));
    let results = by_id(FetchPool::new(batch(ids), 4, fetcher).unwrap().run().await);

    for id in ids {
        assert_eq!(results[&id].body_text().as_deref(), Some(format!("ok-{id}").as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn inflight_fetches_never_exceed_worker_count() {
    for workers in [1, 2, 4, 8] {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(5)));
        let pool = FetchPool::new(batch(0..32), workers, Arc::clone(&fetcher)).unwrap();
        pool.run().await;

        assert_eq!(fetcher.stats.calls.load(Ordering::SeqCst), 32);
        assert_eq!(fetcher.stats.inflight.load(Ordering::SeqCst), 0);
        assert_eq!(
            fetcher.stats.max_inflight.load(Ordering::SeqCst),
            workers,
            "workers={workers}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inflight_bound_holds_under_parallel_runtime() {
    let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(2)));
    let pool = FetchPool::new(batch(0..64), 3, Arc::clone(&fetcher)).unwrap();
    pool.run().await;

    let max = fetcher.stats.max_inflight.load(Ordering::SeqCst);
    assert!((1..=3).contains(&max), "max inflight {max}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_fetches_and_no_workers_remain_after_run() {
    let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(1)));
    let pool = FetchPool::new(batch(0..20), 4, Arc::clone(&fetcher)).unwrap();
    let results = pool.run().await;
    fetcher.stats.closed.store(true, Ordering::SeqCst);

    // Every worker has been joined, so the only remaining owner of the stub is
    // this test.
    assert_eq!(Arc::strong_count(&fetcher), 1);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(results.len(), 20);
    assert_eq!(fetcher.stats.calls.load(Ordering::SeqCst), 20);
    assert_eq!(fetcher.stats.calls_after_close.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn more_workers_than_jobs_still_completes() {
    let fetcher = Arc::new(StubFetcher::default());
    let pool = FetchPool::new(batch(0..2), 16, Arc::clone(&fetcher)).unwrap();
    assert_eq!(pool.worker_count(), 16);
    assert_eq!(pool.len(), 2);

    let results = pool.run().await;
    assert_eq!(results.len(), 2);
    assert_eq!(Arc::strong_count(&fetcher), 1);
}

#[tokio::test]
async fn dropping_an_unrun_pool_stops_its_workers() {
    let fetcher = Arc::new(StubFetcher::default());
    let pool = FetchPool::new(batch(0..4), 3, Arc::clone(&fetcher)).unwrap();
    drop(pool);

    let deadline = Instant::now() + Duration::from_secs(1);
    while Arc::strong_count(&fetcher) > 1 {
        assert!(Instant::now() < deadline, "workers still alive after drop");
        sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(fetcher.stats.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_shutdown_timeout_is_accepted() {
    let config = PoolConfig::new(2).with_shutdown_timeout(Duration::from_millis(50));
    let pool = FetchPool::with_config(batch(0..3), config, StubFetcher::default()).unwrap();
    assert_eq!(pool.run().await.len(), 3);
}

#[test]
fn empty_batch_is_rejected() {
    let err = FetchPool::new(Vec::new(), 2, StubFetcher::default())
        .err()
        .unwrap();
    assert!(err.is_configuration(), "got {err:?}");
}

#[test]
fn zero_workers_is_rejected() {
    let err = FetchPool::new(batch(0..3), 0, StubFetcher::default())
        .err()
        .unwrap();
    assert!(err.is_configuration(), "got {err:?}");
}

#[test]
fn duplicate_identities_are_rejected() {
    let err = FetchPool::new(batch([1, 2, 1]), 2, StubFetcher::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        Error::InvalidConfiguration { ref reason } if reason.contains("duplicate job identity 1")
    ));
}

mod http {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn http_pool_reports_successes_and_transport_failures() {
        let server = MockServer::start().await;
        for id in 0..3 {
            Mock::given(method("GET"))
                .and(path(format!("/items/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("item-{id}")))
                .mount(&server)
                .await;
        }

        let dead_port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut jobs: Vec<Job> = (0..3)
            .map(|id| Job::get(id, &format!("{}/items/{id}", server.uri())).unwrap())
            .collect();
        jobs.push(Job::get(3, &format!("http://127.0.0.1:{dead_port}/items/3")).unwrap());

        let results = by_id(FetchPool::http(jobs, 2).unwrap().run().await);

        for id in 0..3 {
            assert_eq!(results[&id].status(), Some(200));
            assert_eq!(results[&id].body_text().as_deref(), Some(format!("item-{id}").as_str()));
        }
        assert!(matches!(results[&3].failure(), Some(Error::Transport { .. })));
        assert_eq!(results[&3].status(), None);
    }
}
