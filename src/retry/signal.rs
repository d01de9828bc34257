//! Failure classification.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error_handling::TransportError;
use crate::rate_budget::headers::RETRY_AFTER;

/// HTTP status for rate limiting.
pub const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Why an attempt did not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignal {
    /// Connection refused, DNS failure, transport timeout.
    NetworkError(String),
    /// 5xx.
    ServerError(u16),
    /// 429, with the server's `Retry-After` if it sent a usable one.
    TooManyRequests { retry_after: Option<Duration> },
    /// Any other non-success status.
    ClientError(u16),
}

impl FailureSignal {
    pub fn is_throttle(&self) -> bool {
        matches!(self, FailureSignal::TooManyRequests { .. })
    }
}

impl fmt::Display for FailureSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSignal::NetworkError(message) => write!(f, "network error: {}", message),
            FailureSignal::ServerError(status) => write!(f, "server error {}", status),
            FailureSignal::TooManyRequests {
                retry_after: Some(wait),
            } => write!(f, "429 (retry after {}s)", wait.as_secs()),
            FailureSignal::TooManyRequests { retry_after: None } => f.write_str("429"),
            FailureSignal::ClientError(status) => write!(f, "client error {}", status),
        }
    }
}

impl From<&TransportError> for FailureSignal {
    fn from(error: &TransportError) -> Self {
        FailureSignal::NetworkError(error.to_string())
    }
}

/// Classifies a response status. Returns `None` for 2xx.
pub fn classify_status(status: u16, headers: &HeaderMap) -> Option<FailureSignal> {
    match status {
        200..=299 => None,
        HTTP_STATUS_TOO_MANY_REQUESTS => Some(FailureSignal::TooManyRequests {
            retry_after: parse_retry_after(headers),
        }),
        500..=599 => Some(FailureSignal::ServerError(status)),
        _ => Some(FailureSignal::ClientError(status)),
    }
}

/// Reads `Retry-After` as whole seconds.
///
/// Anything else (HTTP dates, negative or fractional values) yields `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
