// Shared test helpers: a scripted in-memory transport and dispatcher configs.
//
// Each test file includes this with `mod helpers;` and uses a subset of it.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::Notify;
use tokio::time::Instant;

use riot_dispatch::{
    DispatcherConfig, RateWindow, RawResponse, Transport, TransportError, TransportRequest,
};

/// One scripted reaction to a send.
#[derive(Clone)]
pub enum Step {
    Reply(RawResponse),
    Fail(TransportError),
    /// Sleep first, then apply the inner step.
    Delay(Duration, Box<Step>),
    /// Block until [`ScriptedTransport::release`] is called, then apply the inner step.
    Gate(Box<Step>),
}

impl Step {
    pub fn ok(body: &str) -> Step {
        Step::Reply(RawResponse::new(200, body))
    }

    pub fn status(status: u16, body: &str) -> Step {
        Step::Reply(RawResponse::new(status, body))
    }

    pub fn with_headers(status: u16, body: &str, headers: &[(&str, &str)]) -> Step {
        Step::Reply(response_with_headers(status, body, headers))
    }

    pub fn connect_error() -> Step {
        Step::Fail(TransportError::Connect("connection refused".to_string()))
    }
}

pub fn response_with_headers(status: u16, body: &str, headers: &[(&str, &str)]) -> RawResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).expect("header name"),
            HeaderValue::from_str(value).expect("header value"),
        );
    }
    RawResponse {
        status,
        headers: map,
        body: body.to_string(),
    }
}

/// A call the transport received.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub at: Instant,
}

/// In-memory transport answering from per-URL scripts.
///
/// Once a URL's script runs out, every further call gets the fallback step.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<Vec<Call>>,
    gate: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::with_fallback(Step::ok(r#"{"ok":true}"#))
    }

    pub fn with_fallback(fallback: Step) -> Self {
        ScriptedTransport {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            gate: Notify::new(),
        }
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.url == url).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Lets every gated call through.
    pub fn release(&self) {
        self.gate.notify_waiters();
    }

    fn next_step(&self, url: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn apply(&self, step: Step) -> Result<RawResponse, TransportError> {
        let mut step = step;
        loop {
            step = match step {
                Step::Reply(response) => return Ok(response),
                Step::Fail(error) => return Err(error),
                Step::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    *inner
                }
                Step::Gate(inner) => {
                    self.gate.notified().await;
                    *inner
                }
            };
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            url: request.url.clone(),
            params: request.params.clone(),
            at: Instant::now(),
        });
        let step = self.next_step(&request.url);
        self.apply(step).await
    }
}

/// A config with generous limits, no jitter, and short backoff.
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        api_key: Some("RGAPI-test".to_string()),
        workers: 4,
        rate_windows: RateWindow::parse_list("100:1").unwrap(),
        max_attempts: 3,
        wait_timeout: Duration::from_secs(600),
        backoff_base: Duration::from_millis(100),
        backoff_cap: Duration::from_secs(2),
        backoff_jitter: Duration::ZERO,
        ..DispatcherConfig::default()
    }
}

pub fn with_windows(config: DispatcherConfig, windows: &str) -> DispatcherConfig {
    DispatcherConfig {
        rate_windows: RateWindow::parse_list(windows).unwrap(),
        ..config
    }
}

/// Yields until `condition` holds, without advancing paused time much.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

pub fn arc(transport: ScriptedTransport) -> Arc<ScriptedTransport> {
    Arc::new(transport)
}
