use crate::telemetry::{
    decrement_fetches_inflight, increment_fetch_failures, increment_fetches,
    increment_fetches_inflight, record_fetch_duration,
};
use core::future::Future;
use fetchpool::{Bytes, Fetch, FetchResponse, Method, Result, Url};
use std::time::Instant;

/// Wraps a fetch capability and records per-request telemetry.
///
/// The in-flight gauge covers both phases of a fetch (request and body), so it
/// mirrors the number of busy workers.
pub struct InstrumentedFetcher<F> {
    inner: F,
}

impl<F> InstrumentedFetcher<F> {
    pub const fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Fetch> Fetch for InstrumentedFetcher<F> {
    type Response = InstrumentedResponse<F::Response>;

    fn fetch(
        &self,
        target: &Url,
        method: &Method,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        let request = self.inner.fetch(target, method);
        async move {
            let start = Instant::now();
            increment_fetches();
            increment_fetches_inflight();

            match request.await {
                Ok(inner) => Ok(InstrumentedResponse { inner, start }),
                Err(e) => {
                    increment_fetch_failures();
                    decrement_fetches_inflight();
                    record_fetch_duration(start.elapsed().as_secs_f64() * 1000.0);
                    Err(e)
                }
            }
        }
    }
}

pub struct InstrumentedResponse<R> {
    inner: R,
    start: Instant,
}

impl<R: FetchResponse> FetchResponse for InstrumentedResponse<R> {
    fn status(&self) -> u16 {
        self.inner.status()
    }

    fn body(self) -> impl Future<Output = Result<Bytes>> + Send {
        let Self { inner, start } = self;
        async move {
            let body = inner.body().await;
            if body.is_err() {
                increment_fetch_failures();
            }
            decrement_fetches_inflight();
            record_fetch_duration(start.elapsed().as_secs_f64() * 1000.0);
            body
        }
    }
}
