//! `reqwest`-backed [`HttpTransport`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use tracing::{debug, info};

use crate::{HttpConfig, HttpResponse, HttpTransport, NodeError};

/// Transport-wide settings. `request_timeout` caps every request; a node's
/// `readTimeoutMs` can lower it for that node.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Sends node requests through a shared, pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    /// Cap on every request; a node's `readTimeoutMs` can only shorten it.
    request_timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with its own connection pool.
    ///
    /// # Errors
    /// Returns [`NodeError::Transport`] if the TLS backend cannot be initialised.
    pub fn new(config: &TransportConfig) -> Result<Self, NodeError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| NodeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }

    /// Effective timeout for one request. A per-request timeout replaces the
    /// client's, so the engine-wide cap is applied here.
    fn timeout_for(&self, config: &HttpConfig) -> Duration {
        Duration::from_millis(config.read_timeout_ms).min(self.request_timeout)
    }
}

fn parse_method(raw: &str) -> Result<Method, NodeError> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        _ => Err(NodeError::UnsupportedMethod(raw.to_owned())),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, config: &HttpConfig) -> Result<HttpResponse, NodeError> {
        let method = parse_method(&config.method)?;
        let url = reqwest::Url::parse(&config.url)
            .map_err(|e| NodeError::InvalidRequest(format!("bad url '{}': {e}", config.url)))?;

        info!("Executing HTTP request: {} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .timeout(self.timeout_for(config));

        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(body) = config.body.as_deref().filter(|b| !b.is_empty()) {
            request = request
                .header(CONTENT_TYPE, config.content_type.as_str())
                .body(body.to_owned());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                NodeError::InvalidRequest(e.to_string())
            } else {
                NodeError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_owned(), v.to_owned()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        debug!("HTTP response status {} ({} bytes)", status, body.len());

        Ok(HttpResponse { status, body, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(&TransportConfig::default()).expect("client builds")
    }

    #[tokio::test]
    async fn sends_method_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_header("x-trace", "abc")
            .match_header("content-type", "text/plain")
            .match_body("hello")
            .with_status(201)
            .with_header("x-order", "42")
            .with_body("created")
            .create_async()
            .await;

        let mut config = HttpConfig::get(format!("{}/orders", server.url()));
        config.method = "post".into();
        config.headers.insert("x-trace".into(), "abc".into());
        config.body = Some("hello".into());
        config.content_type = "text/plain".into();

        let response = transport().send(&config).await.expect("request succeeds");

        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.body, "created");
        assert_eq!(response.headers.get("x-order").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn non_2xx_is_still_a_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let config = HttpConfig::get(format!("{}/broken", server.url()));
        let response = transport().send(&config).await.expect("response received");
        assert_eq!(response.status, 500);
    }

    #[test]
    fn node_read_timeout_only_shortens_the_engine_cap() {
        let transport = ReqwestTransport::new(&TransportConfig {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(200),
        })
        .expect("client builds");

        let mut config = HttpConfig::get("http://svc.local/");
        assert_eq!(transport.timeout_for(&config), Duration::from_millis(200));
        config.read_timeout_ms = 50;
        assert_eq!(transport.timeout_for(&config), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn silent_server_is_cut_off_by_request_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = ReqwestTransport::new(&TransportConfig {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(200),
        })
        .expect("client builds");
        let config = HttpConfig::get(format!("http://{addr}/hang"));
        assert_eq!(config.read_timeout_ms, 30_000);

        let outcome = tokio::time::timeout(Duration::from_secs(3), transport.send(&config))
            .await
            .expect("request gave up before the guard");
        assert!(matches!(outcome, Err(NodeError::Transport(_))));
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected_before_sending() {
        let mut config = HttpConfig::get("http://127.0.0.1:9/never");
        config.method = "TRACE".into();

        let err = transport().send(&config).await.unwrap_err();
        assert_eq!(err, NodeError::UnsupportedMethod("TRACE".into()));
    }

    #[tokio::test]
    async fn malformed_url_is_an_invalid_request() {
        let config = HttpConfig::get("not a url");
        let err = transport().send(&config).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidRequest(_)));
    }
}
