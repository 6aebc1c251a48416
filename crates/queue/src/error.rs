//! Queue-level error type.

use thiserror::Error;

/// Errors returned when submitting work to the pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The pool has been shut down and accepts no new jobs.
    #[error("worker pool is shut down")]
    Closed,
}
