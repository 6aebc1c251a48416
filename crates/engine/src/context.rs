//! Per-run mutable state shared by pool workers and callback resumes.
//!
//! Every mutation is a single operation on a concurrent structure:
//! - node statuses and results live in `DashMap`s (one shard lock per write);
//! - remaining-indegree counters are `AtomicUsize`s in a map whose key set
//!   is fixed when the run starts, so lookups never lock;
//! - ANY-join and callback-resume flags are `AtomicBool`s flipped with a
//!   single compare-exchange.
//!
//! The aggregate [`WorkflowStatus`] sits in a `watch` channel. Recomputing it
//! happens inside the channel's modify closure, so concurrent recomputations
//! serialize and the one triggered by the latest completion event writes
//! last.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::dag::Dag;
use crate::models::{GraphRequest, NodeResult, NodeStatus, WorkflowStatus};

/// Result of trying to claim a callback id for resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackClaim {
    /// This caller won; it must resume `node_id`.
    Claimed(String),
    /// Somebody already resumed this callback.
    AlreadyResumed(String),
    /// This run never issued the id.
    Unknown,
}

struct CallbackSlot {
    node_id: String,
    resumed: AtomicBool,
}

/// Point-in-time copy of a run, as reported to status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusReport {
    pub run_id: String,
    pub workflow_status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub node_statuses: HashMap<String, NodeStatus>,
    pub results: HashMap<String, NodeResult>,
    pub total_duration_ms: u64,
}

/// Thread-safe execution state for one workflow run.
pub struct ExecutionContext {
    run_id: String,
    dag: Dag,
    statuses: DashMap<String, NodeStatus>,
    results: DashMap<String, NodeResult>,
    indegrees: HashMap<String, AtomicUsize>,
    any_triggered: HashMap<String, AtomicBool>,
    callbacks: DashMap<String, CallbackSlot>,
    status: watch::Sender<WorkflowStatus>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl ExecutionContext {
    /// Build the context for a new run: graph structure, one counter per node
    /// seeded with its incoming-edge count, every node PENDING.
    pub fn new(run_id: impl Into<String>, graph: GraphRequest) -> Self {
        let dag = Dag::new(graph);

        let indegrees = dag
            .node_ids()
            .iter()
            .map(|id| (id.clone(), AtomicUsize::new(dag.indegree(id))))
            .collect();
        let any_triggered = dag
            .node_ids()
            .iter()
            .map(|id| (id.clone(), AtomicBool::new(false)))
            .collect();
        let statuses = dag
            .node_ids()
            .iter()
            .map(|id| (id.clone(), NodeStatus::Pending))
            .collect();

        let (status, _) = watch::channel(WorkflowStatus::Running);

        Self {
            run_id: run_id.into(),
            dag,
            statuses,
            results: DashMap::new(),
            indegrees,
            any_triggered,
            callbacks: DashMap::new(),
            status,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    // -----------------------------------------------------------------------
    // Node status and results
    // -----------------------------------------------------------------------

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).map(|s| *s)
    }

    pub fn set_status(&self, node_id: &str, status: NodeStatus) {
        self.statuses.insert(node_id.to_owned(), status);
    }

    pub fn result(&self, node_id: &str) -> Option<NodeResult> {
        self.results.get(node_id).map(|r| r.clone())
    }

    /// Store the result of an executed node, then its terminal status.
    ///
    /// The result is written first so that anyone observing the terminal
    /// status also finds the result.
    pub fn complete(&self, node_id: &str, result: NodeResult) -> NodeStatus {
        let status = if result.is_success() {
            NodeStatus::Success
        } else {
            NodeStatus::Failed
        };
        self.results.insert(node_id.to_owned(), result);
        self.set_status(node_id, status);
        status
    }

    /// Record a dispatch failure.
    pub fn fail(&self, node_id: &str, message: impl Into<String>) {
        self.results
            .insert(node_id.to_owned(), NodeResult::failure(message));
        self.set_status(node_id, NodeStatus::Failed);
    }

    // -----------------------------------------------------------------------
    // Join arbitration
    // -----------------------------------------------------------------------

    /// Atomically consume one incoming edge of `node_id`.
    ///
    /// Returns the remaining count; exactly one caller ever sees `Some(0)`.
    /// `None` means the node has no counter or it was already at zero.
    pub fn decrement_indegree(&self, node_id: &str) -> Option<usize> {
        let counter = self.indegrees.get(node_id)?;
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    /// Flip the ANY-join flag of `node_id`; `true` for the single winner.
    pub fn try_trigger_any(&self, node_id: &str) -> bool {
        self.any_triggered.get(node_id).is_some_and(|flag| {
            flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    /// Park `node_id` under `callback_id`.
    ///
    /// The node is WAITING_CALLBACK before the id is registered, and the id
    /// is registered before it shows up in the node's result, so a resume
    /// can never overtake the suspension.
    pub fn suspend(&self, node_id: &str, callback_id: &str) {
        self.set_status(node_id, NodeStatus::WaitingCallback);
        self.callbacks.insert(
            callback_id.to_owned(),
            CallbackSlot {
                node_id: node_id.to_owned(),
                resumed: AtomicBool::new(false),
            },
        );
        self.results
            .insert(node_id.to_owned(), NodeResult::awaiting_callback(callback_id));
    }

    pub fn owns_callback(&self, callback_id: &str) -> bool {
        self.callbacks.contains_key(callback_id)
    }

    /// The node parked under `callback_id`, if any.
    pub fn callback_node(&self, callback_id: &str) -> Option<String> {
        self.callbacks.get(callback_id).map(|slot| slot.node_id.clone())
    }

    /// One-shot claim of `callback_id`; only the first caller gets `Claimed`.
    pub fn claim_callback(&self, callback_id: &str) -> CallbackClaim {
        let Some(slot) = self.callbacks.get(callback_id) else {
            return CallbackClaim::Unknown;
        };
        match slot
            .resumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => CallbackClaim::Claimed(slot.node_id.clone()),
            Err(_) => CallbackClaim::AlreadyResumed(slot.node_id.clone()),
        }
    }

    /// Store the callback payload on the suspended node and mark it SUCCESS.
    pub fn resume(&self, node_id: &str, payload: String) {
        self.results.entry(node_id.to_owned()).or_default().body = Some(payload);
        self.set_status(node_id, NodeStatus::Success);
    }

    // -----------------------------------------------------------------------
    // Aggregate status
    // -----------------------------------------------------------------------

    pub fn workflow_status(&self) -> WorkflowStatus {
        *self.status.borrow()
    }

    /// Watch the aggregate status.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowStatus> {
        self.status.subscribe()
    }

    /// Recompute the aggregate status from the node statuses.
    ///
    /// While any node is PENDING or RUNNING the run is RUNNING. Once every
    /// node is settled: PARTIALLY_SUSPENDED if one is waiting for a callback,
    /// otherwise FAILED if one failed, otherwise COMPLETED.
    pub fn refresh_workflow_status(&self) -> WorkflowStatus {
        self.status.send_if_modified(|current| {
            let next = self.aggregate();
            if *current == next {
                return false;
            }
            match next {
                WorkflowStatus::Running => debug!("Workflow {} running again", self.run_id),
                WorkflowStatus::PartiallySuspended => info!(
                    "Workflow {} partially suspended (has waiting callbacks)",
                    self.run_id
                ),
                _ => info!("Workflow {} completed with status: {}", self.run_id, next),
            }
            *current = next;
            true
        });
        self.workflow_status()
    }

    fn aggregate(&self) -> WorkflowStatus {
        let mut waiting = false;
        let mut failed = false;
        for entry in self.statuses.iter() {
            let status = *entry.value();
            if !status.is_settled() {
                return WorkflowStatus::Running;
            }
            waiting |= status == NodeStatus::WaitingCallback;
            failed |= status == NodeStatus::Failed;
        }
        if waiting {
            WorkflowStatus::PartiallySuspended
        } else if failed {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        }
    }

    /// Wait until the run is COMPLETED, FAILED or PARTIALLY_SUSPENDED.
    pub async fn wait_until_settled(&self) -> WorkflowStatus {
        let mut rx = self.subscribe();
        let settled = match rx
            .wait_for(|status| *status != WorkflowStatus::Running)
            .await
        {
            Ok(status) => *status,
            // The sender lives as long as `self`, so this is unreachable in
            // practice; report whatever we hold.
            Err(_) => self.workflow_status(),
        };
        settled
    }

    pub fn snapshot(&self) -> RunStatusReport {
        RunStatusReport {
            run_id: self.run_id.clone(),
            workflow_status: self.workflow_status(),
            started_at: self.started_at,
            node_statuses: self
                .statuses
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            results: self
                .results
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            total_duration_ms: self.elapsed_ms(),
        }
    }
}
