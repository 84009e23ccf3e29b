//! Error types for the tiered pool.
//!
//! Errors fall into three propagation classes. Configuration errors are fatal
//! and surface at construction. Errors local to one caller's request (acquire
//! timeout, foreign resource on close) fail only that caller. Errors inside
//! the shared reconciliation pass or the deferred teardown path never fail a
//! caller; they are reported through the notification channel and the
//! reconciliation loop retries after a backoff.

use thiserror::Error;

/// Error type for all pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// An acquire request was not satisfied before its deadline.
    #[error("acquire timed out after {0}ms")]
    AcquireTimeout(u64),

    /// `close` was called with a resource this pool never issued.
    #[error("resource does not belong to this pool")]
    ForeignResource,

    /// A pool item was asked to allocate past its allocation cap.
    #[error("pool item is exhausted")]
    Exhausted,

    /// A pool item was asked to release a resource it does not hold.
    #[error("resource not found in pool item")]
    NotFound,

    /// Creating a heavy resource or a lightweight resource from it failed.
    #[error("failed to create resource: {0}")]
    CreationFailed(String),

    /// Tearing down a resource failed during a deferred close.
    #[error("failed to tear down resource: {0}")]
    TeardownFailed(String),

    /// The pool was dropped while an acquire request was still queued.
    #[error("pool is shut down")]
    Shutdown,
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;
