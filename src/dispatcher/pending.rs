//! Requests, results and the write-once slot between them.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error_handling::{DispatchError, FailureKind, MetricsFanout};
use crate::retry::RetryProgress;
use crate::transport::TransportRequest;

/// Identifies one submission for its whole retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A GET to submit.
///
/// Unset limits fall back to the dispatcher's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: String,
    params: Vec<(String, String)>,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Request {
            url: url.into(),
            params: Vec::new(),
            max_attempts: None,
            timeout: None,
        }
    }

    /// Appends a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attempt budget for network and 5xx failures.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// How long a blocking caller waits for the result.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn wait_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// A successful response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    /// A 200 body that was not JSON, returned as-is.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

/// Final result of a request.
pub type Outcome = Result<Payload, DispatchError>;

/// A request as it moves through the queue.
///
/// Owns the sending half of the result slot. Delivering consumes the request,
/// so a result can be written at most once, and re-enqueueing for a retry
/// moves the request without touching the slot.
pub(crate) struct PendingRequest {
    pub(crate) id: RequestId,
    pub(crate) url: String,
    params: Vec<(String, String)>,
    max_attempts: u32,
    /// Transport calls made so far, of any outcome.
    pub(crate) attempts: u32,
    pub(crate) failures: u32,
    pub(crate) throttles: u32,
    slot: oneshot::Sender<Outcome>,
}

impl PendingRequest {
    pub(crate) fn new(
        id: RequestId,
        request: Request,
        default_max_attempts: u32,
        slot: oneshot::Sender<Outcome>,
    ) -> Self {
        PendingRequest {
            id,
            url: request.url,
            params: request.params,
            max_attempts: request.max_attempts.unwrap_or(default_max_attempts).max(1),
            attempts: 0,
            failures: 0,
            throttles: 0,
            slot,
        }
    }

    pub(crate) fn transport_request(&self, timeout: Duration) -> TransportRequest {
        TransportRequest {
            url: self.url.clone(),
            params: self.params.clone(),
            timeout,
        }
    }

    pub(crate) fn progress(&self) -> RetryProgress {
        RetryProgress {
            failures: self.failures,
            throttles: self.throttles,
            max_attempts: self.max_attempts,
        }
    }

    /// Writes the outcome. Returns `false` if the caller is no longer waiting.
    pub(crate) fn deliver(self, outcome: Outcome) -> bool {
        self.slot.send(outcome).is_ok()
    }
}

/// The caller's side of a submitted request.
pub struct PendingHandle {
    id: RequestId,
    receiver: oneshot::Receiver<Outcome>,
    result: Option<Outcome>,
    timeout: Duration,
    metrics: MetricsFanout,
}

impl PendingHandle {
    pub(crate) fn new(
        id: RequestId,
        receiver: oneshot::Receiver<Outcome>,
        timeout: Duration,
        metrics: MetricsFanout,
    ) -> Self {
        PendingHandle {
            id,
            receiver,
            result: None,
            timeout,
            metrics,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Polls for the result without waiting.
    ///
    /// Once a result has been seen, the same result is returned on every call.
    pub fn try_result(&mut self) -> Option<&Outcome> {
        if self.result.is_none() {
            match self.receiver.try_recv() {
                Ok(outcome) => self.result = Some(outcome),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => self.result = Some(Err(self.dropped())),
            }
        }
        self.result.as_ref()
    }

    /// Waits for the result using the request's timeout.
    pub async fn wait(self) -> Outcome {
        let timeout = self.timeout;
        self.wait_for(timeout).await
    }

    /// Waits up to `timeout` for the result.
    ///
    /// On timeout the slot is closed, so a worker that finishes later has its
    /// result discarded. The request itself keeps running.
    pub async fn wait_for(mut self, timeout: Duration) -> Outcome {
        if let Some(outcome) = self.result.take() {
            return outcome;
        }
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.dropped()),
            Err(_) => {
                self.receiver.close();
                // A result may have landed between the deadline and the close
                match self.receiver.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        log::warn!(
                            "Request {} timed out after {:?} waiting for a result",
                            self.id,
                            timeout
                        );
                        self.metrics.failure(FailureKind::Timeout);
                        Err(DispatchError::Timeout(timeout))
                    }
                }
            }
        }
    }

    fn dropped(&self) -> DispatchError {
        log::warn!("Request {} was dropped before a result was produced", self.id);
        self.metrics.failure(FailureKind::Dropped);
        DispatchError::Dropped
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("ready", &self.result.is_some())
            .finish()
    }
}
