//! Error type definitions.
//!
//! This module defines the errors a caller can observe from the dispatcher, the
//! transport and configuration errors underneath them, and the terminal failure
//! taxonomy used for statistics.

use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The dispatcher configuration was rejected.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

/// Invalid dispatcher configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No API key was passed and `RIOT_API_KEY` is unset.
    #[error("No API key provided (set RIOT_API_KEY or pass --api-key)")]
    MissingApiKey,

    /// The worker pool would be empty.
    #[error("Worker pool size must be at least 1")]
    NoWorkers,

    /// The rate window set is empty.
    #[error("At least one rate window is required")]
    NoRateWindows,

    /// A rate window could not be parsed or has a zero capacity/duration.
    #[error("Invalid rate window '{0}': expected <capacity>:<seconds> with both greater than zero")]
    InvalidRateWindow(String),

    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// The intake queue would have no room.
    #[error("Queue capacity must be at least 1")]
    ZeroQueueCapacity,

    /// A query parameter was not in `key=value` form.
    #[error("Invalid query parameter '{0}': expected key=value")]
    InvalidParam(String),
}

/// Transport-level failure: the request never produced an HTTP status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request or body read exceeded the transport timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure, TLS failure and similar.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending or reading the response.
    #[error("network error: {0}")]
    Other(String),
}

impl From<ReqwestError> for TransportError {
    fn from(error: ReqwestError) -> Self {
        if error.is_timeout() {
            TransportError::Timeout(error.to_string())
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// Terminal outcome of a request that did not succeed.
///
/// Every failure inside the dispatcher resolves to exactly one of these before
/// it reaches the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A 4xx other than 429. Never retried.
    #[error("client error {status}: {body}")]
    ClientError { status: u16, body: String },

    /// Network or 5xx failures persisted for every allowed attempt.
    #[error("gave up after {attempts} attempt(s): {last}")]
    AttemptsExhausted { attempts: u32, last: String },

    /// The server kept answering 429 past the throttle retry cap.
    #[error("still throttled after {retries} rate-limit retries")]
    ThrottleExhausted { retries: u32 },

    /// A 200 response whose body is not valid JSON (text fallback disabled).
    #[error("response body is not valid JSON: {0}")]
    ContentDecode(String),

    /// The caller stopped waiting before a result was produced.
    #[error("no result within {0:?}")]
    Timeout(Duration),

    /// The bounded intake queue had no room for the request.
    #[error("intake queue is full")]
    QueueFull,

    /// The dispatcher no longer accepts or runs requests.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The request was dropped by a worker that was forcibly stopped.
    #[error("request was dropped before a result was produced")]
    Dropped,
}

impl DispatchError {
    /// Returns the statistics category for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::ClientError { .. } => FailureKind::ClientError,
            DispatchError::AttemptsExhausted { .. } => FailureKind::AttemptsExhausted,
            DispatchError::ThrottleExhausted { .. } => FailureKind::ThrottleExhausted,
            DispatchError::ContentDecode(_) => FailureKind::ContentDecode,
            DispatchError::Timeout(_) => FailureKind::Timeout,
            DispatchError::QueueFull => FailureKind::QueueFull,
            DispatchError::ShuttingDown => FailureKind::ShuttingDown,
            DispatchError::Dropped => FailureKind::Dropped,
        }
    }
}

/// Categories of terminal request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum FailureKind {
    ClientError,
    AttemptsExhausted,
    ThrottleExhausted,
    ContentDecode,
    Timeout,
    QueueFull,
    ShuttingDown,
    Dropped,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ClientError => "Client error (4xx)",
            FailureKind::AttemptsExhausted => "Retries exhausted",
            FailureKind::ThrottleExhausted => "Rate-limit retries exhausted",
            FailureKind::ContentDecode => "Content decode error",
            FailureKind::Timeout => "Caller timeout",
            FailureKind::QueueFull => "Queue full",
            FailureKind::ShuttingDown => "Shutting down",
            FailureKind::Dropped => "Dropped at shutdown",
        }
    }
}
