//! Graph submission and run status models.
//!
//! Node definitions live in the `nodes` crate; this module adds the pieces
//! that only make sense at the graph level: edges, the submitted graph, and
//! the status enums tracked per run.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use nodes::model::{HttpConfig, JoinMode, LoopConfig, LoopPolicy, Node, NodeResult, NodeType};

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed dependency: `to_node_id` waits on `from_node_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub from_node_id: String,
    pub to_node_id: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node_id: from.into(),
            to_node_id: to.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// GraphRequest
// ---------------------------------------------------------------------------

/// A graph submitted for execution.
///
/// Assumed well-formed: ids unique, edges reference declared nodes, acyclic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphRequest {
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Suspended until its callback id is resumed.
    WaitingCallback,
}

impl NodeStatus {
    /// SUCCESS, FAILED or WAITING_CALLBACK: nothing more happens without
    /// outside help.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::WaitingCallback)
    }
}

/// Aggregate status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    /// Every node settled, at least one is waiting for a callback.
    PartiallySuspended,
}

impl WorkflowStatus {
    /// COMPLETED or FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::PartiallySuspended => "PARTIALLY_SUSPENDED",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
