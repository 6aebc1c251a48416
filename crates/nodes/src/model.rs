//! Node definitions and per-node execution results.
//!
//! These types are the wire format accepted by the API (camelCase fields,
//! SCREAMING_SNAKE_CASE enum values) and are immutable once a run starts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What a node does when dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Perform an HTTP call through the node executor.
    #[default]
    Http,
    /// Suspend until an external system calls back.
    Callback,
}

/// How repeated attempts of a single HTTP node are driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPolicy {
    /// One attempt.
    #[default]
    None,
    /// Exactly `max_retries` attempts, whatever their outcome.
    FixedCount,
    /// Poll until a 200 response or until `max_timeout_ms` has elapsed.
    UntilSuccess,
}

/// How several predecessors combine to make a node eligible.
///
/// Only meaningful for nodes with two or more incoming edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinMode {
    /// Wait for every predecessor.
    #[default]
    All,
    /// The first predecessor to finish triggers the node; the rest are ignored.
    Any,
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

/// Request template for an HTTP node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub url: String,
    /// GET, POST, PUT, DELETE or PATCH (case-insensitive).
    pub method: String,
    pub headers: HashMap<String, String>,
    /// Sent only when present and non-empty.
    pub body: Option<String>,
    pub content_type: String,
    /// Per-request timeout covering the whole exchange.
    pub read_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_owned(),
            headers: HashMap::new(),
            body: None,
            content_type: "application/json".to_owned(),
            read_timeout_ms: 30_000,
        }
    }
}

impl HttpConfig {
    /// Convenience constructor for a bare GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// LoopConfig
// ---------------------------------------------------------------------------

/// Parameters for [`LoopPolicy::FixedCount`] and [`LoopPolicy::UntilSuccess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopConfig {
    /// Number of attempts for `FIXED_COUNT`.
    pub max_retries: u32,
    /// Pause between attempts.
    pub interval_ms: u64,
    /// Wall-clock budget for `UNTIL_SUCCESS`.
    pub max_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            interval_ms: 1_000,
            max_timeout_ms: 60_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single vertex of the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique within the graph; referenced by edges.
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Only read for HTTP nodes.
    #[serde(default)]
    pub config: Option<HttpConfig>,
    #[serde(default)]
    pub loop_policy: LoopPolicy,
    #[serde(default)]
    pub loop_config: Option<LoopConfig>,
    #[serde(default)]
    pub join_mode: JoinMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Node {
    /// An HTTP node with no loop policy and an ALL join.
    pub fn http(id: impl Into<String>, config: HttpConfig) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Http,
            config: Some(config),
            loop_policy: LoopPolicy::None,
            loop_config: None,
            join_mode: JoinMode::All,
            description: None,
        }
    }

    /// A node that suspends until its callback id is resumed.
    pub fn callback(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Callback,
            config: None,
            loop_policy: LoopPolicy::None,
            loop_config: None,
            join_mode: JoinMode::All,
            description: None,
        }
    }

    pub fn with_loop(mut self, policy: LoopPolicy, config: LoopConfig) -> Self {
        self.loop_policy = policy;
        self.loop_config = Some(config);
        self
    }

    pub fn with_join(mut self, join_mode: JoinMode) -> Self {
        self.join_mode = join_mode;
        self
    }

    /// The node's loop config, or the defaults when none was supplied.
    pub fn effective_loop_config(&self) -> LoopConfig {
        self.loop_config.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// NodeResult
// ---------------------------------------------------------------------------

/// Outcome of executing (or suspending) one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    /// HTTP status of the last attempt; 0 if nothing was received.
    pub status_code: u16,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    /// Set only for CALLBACK nodes.
    pub callback_id: Option<String>,
}

impl NodeResult {
    /// A result for an attempt that never produced a response.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// The placeholder stored for a suspended CALLBACK node.
    pub fn awaiting_callback(callback_id: impl Into<String>) -> Self {
        Self {
            callback_id: Some(callback_id.into()),
            ..Self::default()
        }
    }

    /// Whether the scheduler counts this as a successful node.
    ///
    /// Any received status code counts, including 4xx/5xx; only a
    /// transport-level failure (code 0) marks the node FAILED.
    pub fn is_success(&self) -> bool {
        self.status_code > 0
    }

    /// The loop predicate used by `UNTIL_SUCCESS`.
    pub fn is_ok_response(&self) -> bool {
        self.status_code == 200
    }
}
