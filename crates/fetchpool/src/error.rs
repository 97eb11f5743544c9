//! Error types for the fetch pool.
//!
//! This module defines the central `Error` enum. Only
//! `InvalidConfiguration` is ever returned from a constructor; every other
//! variant describes the failure of a single job and travels inside that job's
//! [`FetchResult`](crate::FetchResult) instead of aborting the batch.
//!
//! ## Error Cases
//! - `InvalidConfiguration`: An empty batch, a zero worker count, a duplicate
//!   job identity, or a malformed target/method.
//! - `Transport`: The request could not complete (connect, TLS, timeout).
//! - `Read`: The response arrived but its body could not be read in full.
//! - `Panicked`: The fetch capability panicked while executing the job.
//! - `WorkerLost`: Every worker exited before the job was executed.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the fetch pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The batch, the worker count, or a job description was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The network exchange with `target` could not be completed.
    #[error("Transport failure for {target}: {reason}")]
    Transport { target: String, reason: String },

    /// A response from `target` was received but its body could not be read.
    #[error("Read failure for {target}: {reason}")]
    Read { target: String, reason: String },

    /// The fetch capability panicked.
    #[error("Fetch panicked: {reason}")]
    Panicked { reason: String },

    /// No worker remained to execute the job.
    #[error("Worker lost before the job was executed")]
    WorkerLost,
}

impl Error {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::Transport`] for `target` from any displayable cause.
    pub fn transport(target: impl Into<String>, reason: impl core::fmt::Display) -> Self {
        Self::Transport {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`Error::Read`] for `target` from any displayable cause.
    pub fn read(target: impl Into<String>, reason: impl core::fmt::Display) -> Self {
        Self::Read {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` for errors raised while building a job or a pool.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}
