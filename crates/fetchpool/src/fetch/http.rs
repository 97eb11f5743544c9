use crate::{Error, Fetch, FetchResponse, Result};
use bytes::Bytes;
use core::{future::Future, time::Duration};
use reqwest::{Client, Method, Url};

/// Total time budget for one request, including reading the body.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP fetch capability backed by a shared [`reqwest::Client`].
///
/// The client keeps its connection pool behind an `Arc`, so cloning an
/// `HttpFetcher` is cheap and every clone shares the same connections.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher bounded by [`DEFAULT_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`HttpFetcher::with_timeout`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a fetcher whose requests fail after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the TLS backend cannot be
    /// initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fetchpool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client. The caller is responsible for its timeout.
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    type Response = HttpResponse;

    fn fetch(
        &self,
        target: &Url,
        method: &Method,
    ) -> impl Future<Output = Result<Self::Response>> + Send {
        let request = self.client.request(method.clone(), target.clone());
        let target = target.to_string();
        async move {
            match request.send().await {
                Ok(inner) => Ok(HttpResponse { target, inner }),
                Err(e) => Err(Error::transport(target, e)),
            }
        }
    }
}

/// A [`reqwest::Response`] paired with the target it came from.
#[derive(Debug)]
pub struct HttpResponse {
    target: String,
    inner: reqwest::Response,
}

impl FetchResponse for HttpResponse {
    fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    fn body(self) -> impl Future<Output = Result<Bytes>> + Send {
        let Self { target, inner } = self;
        async move { inner.bytes().await.map_err(|e| Error::read(target, e)) }
    }
}
