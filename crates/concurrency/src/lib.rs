//! Concurrency layer for the shard registry
//!
//! This crate provides retryable transactions:
//! - [`TransactionRunner`]: object-safe "run in retryable transaction" seam
//! - [`RetryingExecutor`]: bounded retry with exponential backoff
//! - [`RetryPolicy`]: attempt budget and backoff schedule

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod policy;

pub use executor::{
    ExecutorMetrics, RetryingExecutor, TransactionError, TransactionRunner, TransactionRunnerExt,
};
pub use policy::RetryPolicy;
