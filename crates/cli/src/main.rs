//! `dagflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve` — start the API server.
//! - `run`   — execute a graph JSON file locally and print its final report.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::{EngineConfig, GraphRequest, WorkflowStatus};

#[derive(Parser)]
#[command(
    name = "dagflow",
    about = "DAG workflow engine with HTTP and callback nodes",
    version
)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct EngineArgs {
    /// Worker tasks executing nodes (default: 2 × available cores).
    #[arg(long, global = true, env = "DAGFLOW_WORKERS")]
    workers: Option<usize>,

    /// Node jobs that may queue before submissions overflow.
    #[arg(long, global = true, env = "DAGFLOW_QUEUE_CAPACITY", default_value_t = 1000)]
    queue_capacity: usize,

    /// TCP connect timeout for node requests, in milliseconds.
    #[arg(long, global = true, env = "DAGFLOW_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    connect_timeout_ms: u64,

    /// Overall cap on a single node request, in milliseconds.
    #[arg(long, global = true, env = "DAGFLOW_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            queue_capacity: self.queue_capacity,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "DAGFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },
    /// Execute a graph file and print the status report as JSON.
    ///
    /// Exits non-zero if the run FAILED. A run left waiting on callbacks is
    /// reported as PARTIALLY_SUSPENDED; nothing can resume it from here.
    Run {
        /// Path to the graph JSON file (`{ "nodes": [...], "edges": [...] }`).
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.engine.config();
    info!(
        "Engine config: workers={}, queue_capacity={}, connect_timeout={:?}, request_timeout={:?}",
        config.workers, config.queue_capacity, config.connect_timeout, config.request_timeout
    );

    let service = Arc::new(config.build_service()?);

    let code = match cli.command {
        Command::Serve { bind } => {
            info!("Starting API server on {bind}");
            api::serve(bind, api::AppState::new(Arc::clone(&service)), shutdown_signal())
                .await
                .with_context(|| format!("API server on {bind} failed"))?;
            ExitCode::SUCCESS
        }
        Command::Run { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read graph file {}", path.display()))?;
            let graph: GraphRequest = serde_json::from_str(&content)
                .with_context(|| format!("invalid graph JSON in {}", path.display()))?;

            let handle = service.start_run(graph);
            info!("Run {} started: {}", handle.run_id, handle.message);

            let report = service.wait_for_run(&handle.run_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            match report.workflow_status {
                WorkflowStatus::Failed => ExitCode::FAILURE,
                WorkflowStatus::PartiallySuspended => {
                    warn!("Run {} is waiting on callbacks that will never arrive", report.run_id);
                    ExitCode::SUCCESS
                }
                _ => ExitCode::SUCCESS,
            }
        }
    };

    service.shutdown().await;
    Ok(code)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
