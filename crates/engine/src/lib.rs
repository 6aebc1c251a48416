//! `engine` crate — graph model, per-run execution state, the DAG scheduler
//! and the service facade used by the API and CLI.

pub mod models;
pub mod error;
pub mod dag;
pub mod context;
pub mod scheduler;
pub mod registry;
pub mod service;
pub mod config;

pub use models::{Edge, GraphRequest, NodeStatus, WorkflowStatus};
pub use error::EngineError;
pub use dag::Dag;
pub use context::{ExecutionContext, RunStatusReport};
pub use scheduler::DagEngine;
pub use registry::{InMemoryRunStore, RunStore};
pub use service::{ResumeOutcome, RunHandle, WorkflowService};
pub use config::EngineConfig;
