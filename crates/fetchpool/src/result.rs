use crate::{Error, JobId};
use bytes::Bytes;
use std::borrow::Cow;

/// A successfully read response: its status code and full body, byte for
/// byte as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

/// The outcome of executing exactly one [`Job`](crate::Job).
///
/// A failed job has no status and no body. Use [`FetchResult::status`] and
/// [`FetchResult::body_bytes`] rather than assuming a response exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    id: JobId,
    outcome: Result<Response, Error>,
}

impl FetchResult {
    pub const fn success(id: JobId, status: u16, body: Bytes) -> Self {
        Self {
            id,
            outcome: Ok(Response { status, body }),
        }
    }

    pub const fn failed(id: JobId, error: Error) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }

    /// Identity of the job this result belongs to.
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Status code of the response, or `None` if the job failed.
    pub fn status(&self) -> Option<u16> {
        self.outcome.as_ref().ok().map(|r| r.status)
    }

    /// Raw body of the response, or `None` if the job failed.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.outcome.as_ref().ok().map(|r| &r.body)
    }

    /// Body decoded as UTF-8, replacing invalid sequences. Borrows when the
    /// body is already valid UTF-8.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body_bytes().map(|body| String::from_utf8_lossy(body))
    }

    pub fn failure(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub const fn outcome(&self) -> &Result<Response, Error> {
        &self.outcome
    }

    pub fn into_outcome(self) -> Result<Response, Error> {
        self.outcome
    }
}
