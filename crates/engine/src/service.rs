//! Service facade over the scheduler and the run registry.
//!
//! This is what outer layers (the HTTP API, the CLI) talk to:
//! 1. `start_run` registers a new run and seeds its start set.
//! 2. `run_status` reports a run's current state.
//! 3. `resume_callback` routes an external callback to the node that issued it.
//! 4. `evict_run` drops a finished run from the registry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::context::{CallbackClaim, ExecutionContext, RunStatusReport};
use crate::models::{GraphRequest, WorkflowStatus};
use crate::registry::RunStore;
use crate::scheduler::DagEngine;
use crate::EngineError;

/// What a caller gets back from [`WorkflowService::start_run`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub run_id: String,
    pub status: WorkflowStatus,
    pub message: String,
}

/// Outcome of delivering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeOutcome {
    /// The waiting node was resumed and its downstream nodes released.
    Resumed,
    /// No run issued this callback id.
    Unknown,
    /// The callback was already delivered; this delivery was ignored.
    AlreadyResumed,
}

pub struct WorkflowService {
    engine: DagEngine,
    store: Arc<dyn RunStore>,
}

impl WorkflowService {
    pub fn new(engine: DagEngine, store: Arc<dyn RunStore>) -> Self {
        Self { engine, store }
    }

    /// Register and start a new run. Does not wait for any node to finish.
    #[instrument(skip_all, fields(nodes = graph.nodes.len(), edges = graph.edges.len()))]
    pub fn start_run(&self, graph: GraphRequest) -> RunHandle {
        let run_id = Uuid::new_v4().to_string();
        let ctx = Arc::new(ExecutionContext::new(run_id.clone(), graph));
        self.store.put(Arc::clone(&ctx));

        match self.engine.start(&ctx) {
            Ok(()) => {
                info!("Workflow run {} started", run_id);
                RunHandle {
                    run_id,
                    status: WorkflowStatus::Running,
                    message: "Workflow started".to_owned(),
                }
            }
            Err(e) => {
                // Refused start nodes are already FAILED, so the run settles
                // FAILED on its own.
                error!("Workflow run {} could not start: {}", run_id, e);
                RunHandle {
                    run_id,
                    status: WorkflowStatus::Failed,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Current state of a run.
    ///
    /// # Errors
    /// [`EngineError::RunNotFound`] if no run is registered under `run_id`.
    pub fn run_status(&self, run_id: &str) -> Result<RunStatusReport, EngineError> {
        self.context(run_id).map(|ctx| ctx.snapshot())
    }

    /// Wait for a run to settle, then report it.
    ///
    /// # Errors
    /// [`EngineError::RunNotFound`] if no run is registered under `run_id`.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunStatusReport, EngineError> {
        let ctx = self.context(run_id)?;
        ctx.wait_until_settled().await;
        Ok(ctx.snapshot())
    }

    /// Deliver `payload` to whichever node is waiting on `callback_id`.
    ///
    /// Unknown and repeated deliveries are reported, never raised; a repeat
    /// leaves the run untouched.
    #[instrument(skip(self, payload))]
    pub fn resume_callback(&self, callback_id: &str, payload: String) -> ResumeOutcome {
        let Some(ctx) = self.store.find_by_callback(callback_id) else {
            warn!("Unknown callback id: {}", callback_id);
            return ResumeOutcome::Unknown;
        };

        match ctx.claim_callback(callback_id) {
            CallbackClaim::Claimed(node_id) => {
                self.engine.resume_node(&ctx, &node_id, payload);
                ResumeOutcome::Resumed
            }
            CallbackClaim::AlreadyResumed(node_id) => {
                warn!(
                    "Callback {} for node {} already resumed, ignoring duplicate",
                    callback_id, node_id
                );
                ResumeOutcome::AlreadyResumed
            }
            CallbackClaim::Unknown => ResumeOutcome::Unknown,
        }
    }

    /// Remove a COMPLETED or FAILED run from the registry.
    ///
    /// # Errors
    /// [`EngineError::RunNotFound`] for an unknown id,
    /// [`EngineError::RunNotSettled`] while the run can still make progress.
    pub fn evict_run(&self, run_id: &str) -> Result<(), EngineError> {
        let ctx = self.context(run_id)?;
        let status = ctx.workflow_status();
        if !status.is_terminal() {
            return Err(EngineError::RunNotSettled {
                run_id: run_id.to_owned(),
                status,
            });
        }
        self.store.remove(run_id);
        info!("Workflow run {} evicted ({})", run_id, status);
        Ok(())
    }

    /// Number of runs currently registered.
    pub fn run_count(&self) -> usize {
        self.store.len()
    }

    /// Stop the worker pool.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }

    fn context(&self, run_id: &str) -> Result<Arc<ExecutionContext>, EngineError> {
        self.store
            .get(run_id)
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_owned()))
    }
}
