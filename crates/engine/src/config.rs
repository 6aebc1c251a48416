//! Engine configuration and wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use nodes::{HttpTransport, NodeExecutor, ReqwestTransport, TransportConfig};
use queue::{PoolConfig, WorkerPool};

use crate::registry::InMemoryRunStore;
use crate::scheduler::DagEngine;
use crate::service::WorkflowService;
use crate::EngineError;

/// Tuning knobs for a [`WorkflowService`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker tasks in the pool.
    pub workers: usize,
    /// Node jobs that may queue before submissions overflow.
    pub queue_capacity: usize,
    /// TCP connect timeout for node requests.
    pub connect_timeout: Duration,
    /// Cap on a whole node request; a node's `readTimeoutMs` can only shorten it.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        let transport = TransportConfig::default();
        Self {
            workers: pool.workers,
            queue_capacity: pool.queue_capacity,
            connect_timeout: transport.connect_timeout,
            request_timeout: transport.request_timeout,
        }
    }
}

impl EngineConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
        }
    }

    /// Build a service that sends node requests over `reqwest`.
    ///
    /// Must be called from within a tokio runtime (the pool starts here).
    ///
    /// # Errors
    /// [`EngineError::Transport`] if the HTTP client cannot be built.
    pub fn build_service(&self) -> Result<WorkflowService, EngineError> {
        let transport = ReqwestTransport::new(&self.transport_config())?;
        Ok(self.build_service_with(Arc::new(transport)))
    }

    /// Build a service over an arbitrary transport.
    pub fn build_service_with(&self, transport: Arc<dyn HttpTransport>) -> WorkflowService {
        let shutdown = CancellationToken::new();
        let pool = WorkerPool::start(&self.pool_config(), shutdown.clone());
        let engine = DagEngine::new(NodeExecutor::new(transport, shutdown), pool);
        WorkflowService::new(engine, Arc::new(InMemoryRunStore::new()))
    }
}
