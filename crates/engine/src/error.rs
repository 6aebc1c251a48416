//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (dispatch + run bookkeeping).
///
/// None of these abort a run: dispatch errors mark the offending node FAILED
/// and propagation continues; lookup errors are reported to the caller
/// without touching any context.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Dispatch errors ------

    /// A dispatched node id has no definition in the run's graph.
    #[error("node '{0}' is not part of this workflow")]
    UnknownNode(String),

    /// The worker pool refused the submission.
    #[error("could not schedule node '{node_id}': {source}")]
    Schedule {
        node_id: String,
        #[source]
        source: queue::QueueError,
    },

    // ------ Setup errors ------

    /// The HTTP client for node requests could not be built.
    #[error("could not build HTTP transport: {0}")]
    Transport(#[from] nodes::NodeError),

    // ------ Lookup errors ------

    /// No run is registered under this id.
    #[error("workflow run '{0}' not found")]
    RunNotFound(String),

    /// The run exists but is still running or suspended.
    #[error("workflow run '{run_id}' has not settled (status {status})")]
    RunNotSettled {
        run_id: String,
        status: crate::WorkflowStatus,
    },
}
