//! The fetch capability used by workers.
//!
//! A fetch happens in two phases, mirrored by the two traits here:
//!
//! 1. [`Fetch::fetch`] performs the request and yields a [`FetchResponse`], or
//!    a transport failure.
//! 2. [`FetchResponse::body`] reads the full body, or yields a read failure.
//!
//! A response value only exists once the request succeeded, so a worker cannot
//! inspect the status of a failed request.
//!
//! ## Implementations
//!
//! - [`HttpFetcher`] - `reqwest`-backed HTTP with a bounded timeout.
//!
//! Tests and benches provide in-memory stubs.

mod http;

pub use http::*;

use crate::Result;
use bytes::Bytes;
use core::future::Future;
use reqwest::{Method, Url};
use std::sync::Arc;

/// A capability that performs one network request.
///
/// Implementations are shared by every worker of a pool and must therefore be
/// `Send + Sync`. They must bound their own duration and report failures as
/// [`Error::Transport`](crate::Error::Transport) values rather than panicking.
pub trait Fetch: Send + Sync + 'static {
    type Response: FetchResponse;

    /// Sends `method` to `target` and resolves once response headers arrive.
    ///
    /// A non-2xx status is a successful fetch.
    fn fetch(
        &self,
        target: &Url,
        method: &Method,
    ) -> impl Future<Output = Result<Self::Response>> + Send;
}

/// A response whose headers have been received but whose body is unread.
pub trait FetchResponse: Send {
    fn status(&self) -> u16;

    /// Reads the remaining body in full.
    fn body(self) -> impl Future<Output = Result<Bytes>> + Send;
}

impl<F: Fetch> Fetch for Arc<F> {
    type Response = F::Response;

    fn fetch(
        &self,
        target: &Url,
        method: &Method,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        F::fetch(self, target, method)
    }
}
