//! `queue` crate — the bounded worker pool that runs node dispatches.
//!
//! Jobs are boxed futures. A fixed set of worker tasks pulls them off a
//! bounded channel; submission never blocks the caller.

pub mod error;
pub mod pool;

pub use error::QueueError;
pub use pool::{panic_message, Job, PoolConfig, WorkerPool};
