//! DAG scheduler.
//!
//! `DagEngine` drives one or more runs over a shared worker pool:
//! 1. `start` submits every node with no incoming edges.
//! 2. A pool worker dispatches the node: HTTP nodes go through the
//!    [`NodeExecutor`]; CALLBACK nodes are parked under a fresh callback id.
//! 3. After an HTTP node finishes (or fails to dispatch), `on_node_complete`
//!    releases its downstream nodes: ANY-joins through a one-shot flag,
//!    ALL-joins once their remaining-indegree counter hits zero.
//! 4. `resume_node` finishes a parked CALLBACK node and propagates on the
//!    caller's thread.
//!
//! A failed node releases its children exactly like a successful one,
//! including a node the pool refused to run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::NodeExecutor;
use queue::{panic_message, WorkerPool};

use crate::context::ExecutionContext;
use crate::models::{JoinMode, NodeStatus, NodeType};
use crate::EngineError;

/// How a dispatch ended.
enum Dispatched {
    /// The node reached SUCCESS or FAILED.
    Completed,
    /// The node is WAITING_CALLBACK.
    Suspended,
}

/// Cheaply cloneable handle to the scheduler.
#[derive(Clone)]
pub struct DagEngine {
    inner: Arc<Inner>,
}

struct Inner {
    executor: NodeExecutor,
    pool: WorkerPool,
}

impl DagEngine {
    pub fn new(executor: NodeExecutor, pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(Inner { executor, pool }),
        }
    }

    /// Submit the start set of `ctx`. Returns as soon as it is queued.
    ///
    /// A start node the pool refuses is marked FAILED and propagated like any
    /// other failure, so the run still settles.
    ///
    /// # Errors
    /// Returns the first [`EngineError::Schedule`] if the pool refuses a
    /// start node.
    #[instrument(skip_all, fields(run_id = %ctx.run_id()))]
    pub fn start(&self, ctx: &Arc<ExecutionContext>) -> Result<(), EngineError> {
        let start_nodes = ctx.dag().start_nodes();
        info!(
            "Starting workflow {} with {} nodes, start nodes: {:?}",
            ctx.run_id(),
            ctx.dag().len(),
            start_nodes
        );

        if start_nodes.is_empty() {
            // Nothing to run: an empty graph settles straight away.
            ctx.refresh_workflow_status();
            return Ok(());
        }

        let mut refused = None;
        for node_id in start_nodes {
            if let Err(e) = self.submit(ctx, node_id.clone()) {
                error!("{}", e);
                self.fail_unscheduled(ctx, &node_id, &e);
                refused.get_or_insert(e);
            }
        }
        refused.map_or(Ok(()), Err)
    }

    /// Finish the CALLBACK node `node_id` with `payload` and release its
    /// downstream nodes.
    ///
    /// The caller must already own the callback (see
    /// [`ExecutionContext::claim_callback`]); this does not re-check it.
    #[instrument(skip(self, ctx, payload), fields(run_id = %ctx.run_id()))]
    pub fn resume_node(&self, ctx: &Arc<ExecutionContext>, node_id: &str, payload: String) {
        info!("Resuming callback node {} ({} byte payload)", node_id, payload.len());
        ctx.resume(node_id, payload);
        self.on_node_complete(ctx, node_id);
    }

    /// Stop the worker pool. Loop sleeps in flight are interrupted.
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    // -----------------------------------------------------------------------
    // Internal: submission and dispatch.
    // -----------------------------------------------------------------------

    pub(crate) fn submit(
        &self,
        ctx: &Arc<ExecutionContext>,
        node_id: String,
    ) -> Result<(), EngineError> {
        let engine = self.clone();
        let job_ctx = Arc::clone(ctx);
        let job_node = node_id.clone();

        debug!("Submitting node {}", node_id);
        self.inner
            .pool
            .submit(async move { engine.run_node(job_ctx, job_node).await })
            .map_err(|source| EngineError::Schedule { node_id, source })
    }

    /// Pool entry point for one node. Never fails: any error or panic out of
    /// dispatch marks the node FAILED and propagation still runs.
    async fn run_node(self, ctx: Arc<ExecutionContext>, node_id: String) {
        let outcome = AssertUnwindSafe(self.dispatch(&ctx, &node_id))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(Dispatched::Completed)) => None,
            Ok(Ok(Dispatched::Suspended)) => {
                ctx.refresh_workflow_status();
                return;
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(format!(
                "dispatch of node '{}' panicked: {}",
                node_id,
                panic_message(panic.as_ref())
            )),
        };

        if let Some(message) = failure {
            error!("Node {} failed during dispatch: {}", node_id, message);
            ctx.fail(&node_id, message);
        }
        self.on_node_complete(&ctx, &node_id);
    }

    async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        node_id: &str,
    ) -> Result<Dispatched, EngineError> {
        let node = ctx
            .dag()
            .node(node_id)
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_owned()))?;

        ctx.set_status(node_id, NodeStatus::Running);

        match node.node_type {
            NodeType::Http => {
                info!("Executing HTTP node: {}", node_id);
                let result = self.inner.executor.execute(node).await;
                let status_code = result.status_code;
                let status = ctx.complete(node_id, result);
                info!(
                    "Node {} finished: status={:?}, httpStatus={}",
                    node_id, status, status_code
                );
                Ok(Dispatched::Completed)
            }
            NodeType::Callback => {
                let callback_id = Uuid::new_v4().to_string();
                ctx.suspend(node_id, &callback_id);
                info!(
                    "Node {} waiting for callback: callbackId={}",
                    node_id, callback_id
                );
                Ok(Dispatched::Suspended)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: completion propagation.
    // -----------------------------------------------------------------------

    pub(crate) fn on_node_complete(&self, ctx: &Arc<ExecutionContext>, node_id: &str) {
        for child in ctx.dag().downstream(node_id) {
            let Some(node) = ctx.dag().node(child) else {
                warn!("Skipping undeclared downstream node {} of {}", child, node_id);
                continue;
            };

            let ready = match node.join_mode {
                JoinMode::Any => {
                    let won = ctx.try_trigger_any(child);
                    if !won {
                        debug!("ANY-join {} already triggered, {} is a no-op", child, node_id);
                    }
                    won
                }
                JoinMode::All => match ctx.decrement_indegree(child) {
                    Some(0) => true,
                    Some(remaining) => {
                        debug!("ALL-join {} waiting on {} more predecessor(s)", child, remaining);
                        false
                    }
                    None => {
                        warn!("Indegree of {} already exhausted, ignoring {}", child, node_id);
                        false
                    }
                },
            };

            if ready {
                if let Err(e) = self.submit(ctx, child.clone()) {
                    error!("{}", e);
                    self.fail_unscheduled(ctx, child, &e);
                }
            }
        }

        ctx.refresh_workflow_status();
    }

    /// Mark a node the pool refused as FAILED and release its children.
    fn fail_unscheduled(&self, ctx: &Arc<ExecutionContext>, node_id: &str, e: &EngineError) {
        ctx.fail(node_id, e.to_string());
        self.on_node_complete(ctx, node_id);
    }
}
