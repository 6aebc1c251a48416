//! `MockTransport` — a scripted test double for [`HttpTransport`].
//!
//! Useful wherever a real HTTP endpoint is unavailable or irrelevant: node
//! executor tests, scheduler tests and the API layer. Every call is recorded,
//! and responses follow a per-URL script.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{HttpConfig, HttpResponse, HttpTransport, NodeError};

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Answer with the given status and body.
    Respond { status: u16, body: String },
    /// Fail the attempt with a transport error.
    Fail(String),
    /// Panic inside the transport.
    Panic(String),
}

impl MockStep {
    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            body: String::new(),
        }
    }
}

/// A transport-level event, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Started(String),
    Finished(String),
}

/// A mock transport that records every call it receives and answers from a
/// programmer-specified script.
///
/// Each URL walks through its own script; once the script is exhausted the
/// last step repeats forever.
#[derive(Clone)]
pub struct MockTransport {
    default_script: Vec<MockStep>,
    routes: HashMap<String, Vec<MockStep>>,
    latency: HashMap<String, Duration>,
    default_latency: Duration,
    /// All requests seen (in call order).
    calls: Arc<Mutex<Vec<HttpConfig>>>,
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockTransport {
    /// Every request gets the given status code.
    pub fn returning(status: u16) -> Self {
        Self::scripted(vec![MockStep::status(status)])
    }

    /// Every request follows `script`.
    pub fn scripted(script: Vec<MockStep>) -> Self {
        Self {
            default_script: script,
            routes: HashMap::new(),
            latency: HashMap::new(),
            default_latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests to `url` follow `script` instead of the default one.
    pub fn route(mut self, url: impl Into<String>, script: Vec<MockStep>) -> Self {
        self.routes.insert(url.into(), script);
        self
    }

    /// Requests to `url` take `delay` before answering.
    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.latency.insert(url.into(), delay);
        self
    }

    /// Every request takes at least `delay` before answering.
    pub fn with_latency(mut self, delay: Duration) -> Self {
        self.default_latency = delay;
        self
    }

    /// Total number of requests received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of requests received for `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url == url)
            .count()
    }

    /// Position of `event` in the event log, if it happened.
    pub fn position(&self, event: &MockEvent) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == event)
    }

    fn next_step(&self, config: &HttpConfig) -> (MockStep, Duration) {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|c| c.url == config.url).count();
            calls.push(config.clone());
            previous
        };

        let script = self.routes.get(&config.url).unwrap_or(&self.default_script);
        let step = script
            .get(attempt)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or_else(|| MockStep::status(200));
        let delay = self
            .latency
            .get(&config.url)
            .copied()
            .unwrap_or(self.default_latency);
        (step, delay)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, config: &HttpConfig) -> Result<HttpResponse, NodeError> {
        let (step, delay) = self.next_step(config);
        self.events
            .lock()
            .unwrap()
            .push(MockEvent::Started(config.url.clone()));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = match step {
            MockStep::Respond { status, body } => Ok(HttpResponse {
                status,
                body,
                headers: HashMap::new(),
            }),
            MockStep::Fail(msg) => Err(NodeError::Transport(msg)),
            MockStep::Panic(msg) => panic!("{msg}"),
        };

        self.events
            .lock()
            .unwrap()
            .push(MockEvent::Finished(config.url.clone()));
        outcome
    }
}
