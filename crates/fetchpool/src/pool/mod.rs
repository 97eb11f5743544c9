//! Worker pool that executes one batch of fetch jobs.
//!
//! This module manages a set of asynchronous worker tasks that share a single
//! job queue. It provides:
//!
//! - Pull-based distribution: every idle worker competes for the next job
//! - A completion barrier: the batch finishes once every job has a result
//! - Graceful shutdown coordination via per-worker cancellation tokens and
//!   joined task handles
//!
//! ## Submodules
//!
//! - [`worker`] - Defines the worker task loop and job execution.
//! - [`manager`] - Orchestrates the pool, result collection and shutdown.
mod manager;
mod worker;

#[cfg(test)]
mod tests;

pub use manager::*;
