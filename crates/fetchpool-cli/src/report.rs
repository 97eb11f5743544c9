use core::{fmt, time::Duration};
use fetchpool::{FetchResult, JobId};
use serde::Serialize;
use std::borrow::Cow;

/// One printed line of the report.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Entry {
    pub id: JobId,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Length of the raw body, which may differ from `body.len()` when the
    /// payload is not valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything printed after a batch: the results sorted by identity and a
/// summary.
#[derive(Debug, Serialize)]
pub struct Report {
    pub requests: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub results: Vec<Entry>,
}

impl Report {
    /// Builds a report; `target_of` maps a job identity back to its URL.
    pub fn new(
        results: Vec<FetchResult>,
        elapsed: Duration,
        target_of: impl Fn(JobId) -> String,
    ) -> Self {
        let mut entries: Vec<Entry> = results
            .into_iter()
            .map(|result| Entry {
                id: result.id(),
                target: target_of(result.id()),
                status: result.status(),
                bytes: result.body_bytes().map(|body| body.len()),
                body: result.body_text().map(Cow::into_owned),
                error: result.failure().map(ToString::to_string),
            })
            .collect();
        entries.sort_by_key(|e| e.id);

        Self {
            requests: entries.len(),
            failed: entries.iter().filter(|e| e.error.is_some()).count(),
            elapsed_secs: elapsed.as_secs_f64(),
            results: entries,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.results {
            match (&entry.error, entry.status, entry.bytes, &entry.body) {
                (Some(error), ..) => writeln!(f, "#{} failed: {}", entry.id, error)?,
                (None, Some(status), Some(bytes), Some(body)) => writeln!(
                    f,
                    "#{} status={} bytes={} {}",
                    entry.id, status, bytes, body
                )?,
                (None, ..) => writeln!(f, "#{} no response", entry.id)?,
            }
        }
        write!(
            f,
            "{} requests, {} failed, {:.3}s",
            self.requests, self.failed, self.elapsed_secs
        )
    }
}
