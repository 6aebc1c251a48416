//! Node executor.
//!
//! `NodeExecutor::execute` runs one HTTP node to completion:
//! 1. Performs attempts through the injected [`HttpTransport`].
//! 2. Applies the node's [`LoopPolicy`] (`NONE`, `FIXED_COUNT`, `UNTIL_SUCCESS`).
//! 3. Converts every failure (transport errors, panics, bad config) into a
//!    [`NodeResult`] with status 0 and an error message; it never fails.
//! 4. Stamps start/end/duration around the whole loop, not a single attempt.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use queue::panic_message;

use crate::{HttpConfig, HttpTransport, LoopPolicy, Node, NodeError, NodeResult};

/// Executes HTTP nodes, honouring their loop policy.
///
/// Sleeps between attempts only hold up the task running this node. The
/// cancellation token interrupts those sleeps; an interrupted loop returns
/// the result it already holds.
#[derive(Clone)]
pub struct NodeExecutor {
    transport: Arc<dyn HttpTransport>,
    cancel: CancellationToken,
}

impl NodeExecutor {
    /// Create a new executor.
    pub fn new(transport: Arc<dyn HttpTransport>, cancel: CancellationToken) -> Self {
        Self { transport, cancel }
    }

    /// Run `node` and return the result of its final attempt.
    #[instrument(skip(self, node), fields(node_id = %node.id, policy = ?node.loop_policy))]
    pub async fn execute(&self, node: &Node) -> NodeResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let mut result = match node.config.as_ref() {
            None => NodeResult::failure(format!("HTTP node '{}' has no request config", node.id)),
            Some(config) => match node.loop_policy {
                LoopPolicy::None => self.attempt(config).await,
                LoopPolicy::FixedCount => self.fixed_count(node, config).await,
                LoopPolicy::UntilSuccess => self.until_success(node, config).await,
            },
        };

        result.start_time = Some(started_at);
        result.end_time = Some(Utc::now());
        result.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        result
    }

    // -----------------------------------------------------------------------
    // Internal: one attempt.
    // -----------------------------------------------------------------------

    async fn attempt(&self, config: &HttpConfig) -> NodeResult {
        match AssertUnwindSafe(self.transport.send(config))
            .catch_unwind()
            .await
        {
            Ok(Ok(response)) => NodeResult {
                status_code: response.status,
                body: Some(response.body),
                headers: response.headers,
                ..NodeResult::default()
            },
            Ok(Err(e)) => {
                error!("HTTP request {} {} failed: {}", config.method, config.url, e);
                NodeResult::failure(e.to_string())
            }
            Err(panic) => {
                let err = NodeError::Panicked(panic_message(panic.as_ref()));
                error!("HTTP request {} {} failed: {}", config.method, config.url, err);
                NodeResult::failure(err.to_string())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: loop policies.
    // -----------------------------------------------------------------------

    async fn fixed_count(&self, node: &Node, config: &HttpConfig) -> NodeResult {
        let loop_config = node.effective_loop_config();
        let attempts = loop_config.max_retries.max(1);
        let interval = Duration::from_millis(loop_config.interval_ms);

        info!("Executing FIXED_COUNT loop: node={}, attempts={}", node.id, attempts);

        let mut last = self.attempt(config).await;
        for iteration in 2..=attempts {
            if !self.pause(interval).await {
                warn!("Loop interrupted for node {}", node.id);
                break;
            }
            debug!("Loop iteration {}/{} for node {}", iteration, attempts, node.id);
            last = self.attempt(config).await;
        }
        last
    }

    async fn until_success(&self, node: &Node, config: &HttpConfig) -> NodeResult {
        let loop_config = node.effective_loop_config();
        let interval = Duration::from_millis(loop_config.interval_ms);
        let budget = Duration::from_millis(loop_config.max_timeout_ms);
        let started = Instant::now();

        info!(
            "Executing UNTIL_SUCCESS loop: node={}, maxTimeout={}ms",
            node.id, loop_config.max_timeout_ms
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!("Loop attempt {} for node {}", attempt, node.id);

            let result = self.attempt(config).await;
            if result.is_ok_response() {
                info!("UNTIL_SUCCESS succeeded on attempt {} for node {}", attempt, node.id);
                return result;
            }

            if started.elapsed() >= budget {
                warn!(
                    "UNTIL_SUCCESS timeout after {}ms ({} attempts) for node {}",
                    loop_config.max_timeout_ms, attempt, node.id
                );
                return result;
            }

            if !self.pause(interval).await {
                warn!("Loop interrupted for node {}", node.id);
                return result;
            }
        }
    }

    /// Sleep for `interval`; `false` if the sleep was interrupted.
    async fn pause(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}
