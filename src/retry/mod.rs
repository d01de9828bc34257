//! Failure classification and backoff.
//!
//! This module provides:
//! - `FailureSignal`, the classification of a failed attempt
//! - `BackoffPolicy`, which turns a signal and a request's history into a
//!   `RetryDecision`

mod policy;
mod signal;

pub use policy::{BackoffPolicy, RetryDecision, RetryProgress};
pub use signal::{classify_status, parse_retry_after, FailureSignal, HTTP_STATUS_TOO_MANY_REQUESTS};
