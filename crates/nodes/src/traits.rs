//! The `HttpTransport` trait — the seam between a node and the network.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{HttpConfig, NodeError};

/// A response as seen by the executor: status, body and flattened headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// Performs exactly one attempt of an HTTP node's request.
///
/// Implementations report every failure as a [`NodeError`]; retries and
/// polling belong to the [`NodeExecutor`](crate::NodeExecutor), not here.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request described by `config` and return the response.
    async fn send(&self, config: &HttpConfig) -> Result<HttpResponse, NodeError>;
}
