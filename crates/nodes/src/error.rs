//! Node-level error type.

use thiserror::Error;

/// Errors raised while performing a single attempt of a node's unit of work.
///
/// These never leave the [`NodeExecutor`](crate::NodeExecutor): every variant
/// is folded into a `NodeResult` with status code 0 and an error message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The configured HTTP method is not one the executor knows how to send.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The request could not be built (bad URL, bad header, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connection, timeout or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport panicked while handling the request.
    #[error("transport panicked: {0}")]
    Panicked(String),
}
