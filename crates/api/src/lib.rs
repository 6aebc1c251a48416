//! `api` crate — HTTP surface over [`engine::WorkflowService`].
//!
//! Exposes:
//!   POST   /api/workflow/run
//!   GET    /api/workflow/{runId}/status
//!   DELETE /api/workflow/{runId}
//!   POST   /api/hooks/{callbackId}

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use engine::WorkflowService;

mod handlers;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/workflow/run", post(handlers::workflows::run))
        .route("/api/workflow/:run_id/status", get(handlers::workflows::status))
        .route("/api/workflow/:run_id", delete(handlers::workflows::evict))
        .route("/api/hooks/:callback_id", post(handlers::webhooks::handle_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
///
/// # Errors
/// Returns the I/O error if the address cannot be bound or the server fails.
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod api_tests;
