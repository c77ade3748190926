//! Retrying transaction executor
//!
//! Runs a unit of work and re-runs it from scratch when it fails with a
//! transient error (write conflict, store briefly unavailable).
//!
//! ## Execution Sequence
//!
//! ```text
//! 1. attempt = 1
//! 2. run unit of work
//! 3. IF Ok: record commit, return value
//! 4. IF fatal error: record failure, return Fatal
//! 5. IF transient and attempt < max_attempts: sleep(backoff), double backoff, goto 2
//! 6. ELSE: record failure, return RetriesExhausted
//! ```
//!
//! Units of work may run several times. They must be idempotent and must not
//! publish side effects that outlive a failed attempt.

use crate::policy::RetryPolicy;
use shardreg_core::error::Error as StoreError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{error, warn};

/// Failure of a unit of work after the executor gave up
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Every attempt hit a transient error
    #[error("{label}: gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Label of the unit of work
        label: String,
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        last: StoreError,
    },

    /// The unit of work failed with a non-retryable error
    #[error("{label}: {source}")]
    Fatal {
        /// Label of the unit of work
        label: String,
        /// Underlying error
        #[source]
        source: StoreError,
    },
}

impl TransactionError {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            TransactionError::RetriesExhausted { attempts, .. } => *attempts,
            TransactionError::Fatal { .. } => 1,
        }
    }

    /// The underlying store error
    pub fn store_error(&self) -> &StoreError {
        match self {
            TransactionError::RetriesExhausted { last, .. } => last,
            TransactionError::Fatal { source, .. } => source,
        }
    }
}

/// Runs units of work inside retryable transactions
///
/// Object-safe so the registry can hold any runner behind an `Arc<dyn _>`.
/// Use [`TransactionRunnerExt::run_in_transaction`] for the typed form.
pub trait TransactionRunner: Send + Sync {
    /// Run `work` until it succeeds, fails fatally, or the retry budget runs out
    fn run_unit(
        &self,
        label: &str,
        work: &mut dyn FnMut() -> Result<(), StoreError>,
    ) -> Result<(), TransactionError>;
}

/// Typed convenience over [`TransactionRunner`]
pub trait TransactionRunnerExt: TransactionRunner {
    /// Run a unit of work producing a value
    ///
    /// The value of the successful attempt is returned.
    fn run_in_transaction<T, F>(&self, label: &str, mut work: F) -> Result<T, TransactionError>
    where
        F: FnMut() -> Result<T, StoreError>,
    {
        let mut output = None;
        self.run_unit(label, &mut || {
            output = Some(work()?);
            Ok(())
        })?;
        output.ok_or_else(|| TransactionError::Fatal {
            label: label.to_string(),
            source: StoreError::InvalidInput("unit of work committed without a result".into()),
        })
    }
}

impl<R: TransactionRunner + ?Sized> TransactionRunnerExt for R {}

/// Executor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorMetrics {
    /// Units of work that eventually succeeded
    pub committed: u64,
    /// Units of work that failed (fatal or exhausted)
    pub failed: u64,
    /// Individual re-runs after a transient error
    pub retried: u64,
}

/// Bounded-retry executor with exponential backoff
///
/// # Thread Safety
///
/// Stateless apart from its counters; any number of threads may run units
/// concurrently.
pub struct RetryingExecutor {
    policy: RetryPolicy,
    committed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl RetryingExecutor {
    /// Create an executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            committed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
        }
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> ExecutorMetrics {
        ExecutorMetrics {
            committed: self.committed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

impl Default for RetryingExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl TransactionRunner for RetryingExecutor {
    fn run_unit(
        &self,
        label: &str,
        work: &mut dyn FnMut() -> Result<(), StoreError>,
    ) -> Result<(), TransactionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match work() {
                Ok(()) => {
                    self.committed.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if !e.is_transient() => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    return Err(TransactionError::Fatal {
                        label: label.to_string(),
                        source: e,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(label, attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(TransactionError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        label,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    self.retried.fetch_add(1, Ordering::Relaxed);
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
