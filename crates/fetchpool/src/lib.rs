#![doc = include_str!("../README.md")]

mod error;
mod fetch;
mod job;
mod pool;
mod result;

pub use crate::error::*;
pub use crate::fetch::*;
pub use crate::job::*;
pub use crate::pool::*;
pub use crate::result::*;

// Re-exported so callers can build jobs and custom fetchers without naming
// `reqwest` or `bytes` themselves.
pub use bytes::Bytes;
pub use reqwest::{Method, Url};
