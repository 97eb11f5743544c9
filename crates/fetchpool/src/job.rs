use crate::{Error, Result};
use reqwest::{Method, Url};

/// Caller-assigned identity of a [`Job`].
///
/// Identities must be unique within one batch; they are the only key used to
/// correlate a [`FetchResult`](crate::FetchResult) with the job it came from.
pub type JobId = u64;

/// An immutable description of one fetch.
///
/// A job is built before the pool exists and is moved into it. Workers only
/// ever read it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    target: Url,
    method: Method,
}

impl Job {
    /// Builds a job from a textual target and method.
    ///
    /// The target must be an absolute `http` or `https` URL. The method is any
    /// valid HTTP method token and is matched case-insensitively, so `"get"`
    /// and `"GET"` are the same job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the target does not parse,
    /// uses another scheme, or the method is not a valid token.
    ///
    /// # Example
    /// ```
    /// use fetchpool::Job;
    ///
    /// let job = Job::new(7, "https://example.com/items/7", "get").unwrap();
    /// assert_eq!(job.id(), 7);
    /// assert_eq!(job.method().as_str(), "GET");
    ///
    /// assert!(Job::new(8, "ftp://example.com", "GET").is_err());
    /// ```
    pub fn new(id: JobId, target: &str, method: &str) -> Result<Self> {
        let target = parse_target(target)?;
        let method = parse_method(method)?;
        Ok(Self::from_parts(id, target, method))
    }

    /// Shorthand for a `GET` job.
    ///
    /// # Errors
    ///
    /// See [`Job::new`].
    pub fn get(id: JobId, target: &str) -> Result<Self> {
        Ok(Self::from_parts(id, parse_target(target)?, Method::GET))
    }

    /// Builds a job from already-validated parts.
    pub const fn from_parts(id: JobId, target: Url, method: Method) -> Self {
        Self { id, target, method }
    }

    pub const fn id(&self) -> JobId {
        self.id
    }

    pub const fn target(&self) -> &Url {
        &self.target
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }
}

fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::invalid(format!("target `{raw}`: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::invalid(format!(
            "target `{raw}`: unsupported scheme `{other}`"
        ))),
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::invalid(format!("method `{raw}` is not a valid HTTP method")))
}
