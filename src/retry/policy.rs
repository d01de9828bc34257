//! Retry decisions.

use std::time::Duration;

use rand::Rng;
use tokio_retry::strategy::ExponentialBackoff;

use super::signal::FailureSignal;
use crate::config::{
    BACKOFF_BASE_MS, BACKOFF_CAP_SECS, BACKOFF_JITTER_MS, MAX_THROTTLE_RETRIES,
    THROTTLE_DEFAULT_WAIT_SECS,
};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the request once this much time has passed.
    Retry(Duration),
    /// Stop and report a terminal failure.
    GiveUp,
}

/// How many times a request has failed so far, by failure class.
///
/// 429s are counted apart from network and 5xx failures: a throttle is an
/// explicit server instruction, not a sign the request is broken, so it does
/// not use up `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryProgress {
    /// Network and 5xx failures, including the one being decided.
    pub failures: u32,
    /// 429 responses, including the one being decided.
    pub throttles: u32,
    pub max_attempts: u32,
}

/// Maps a failure and the request's history to a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter: Duration,
    throttle_default: Duration,
    max_throttle_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_millis(BACKOFF_BASE_MS),
            cap: Duration::from_secs(BACKOFF_CAP_SECS),
            jitter: Duration::from_millis(BACKOFF_JITTER_MS),
            throttle_default: Duration::from_secs(THROTTLE_DEFAULT_WAIT_SECS),
            max_throttle_retries: MAX_THROTTLE_RETRIES,
        }
    }
}

impl BackoffPolicy {
    pub fn new(
        base: Duration,
        cap: Duration,
        jitter: Duration,
        throttle_default: Duration,
        max_throttle_retries: u32,
    ) -> Self {
        BackoffPolicy {
            base,
            cap,
            jitter,
            throttle_default,
            max_throttle_retries,
        }
    }

    /// Exponential schedule without jitter: `base`, `2 * base`, `4 * base`, ...
    /// capped at `cap`.
    ///
    /// `base` is used at 2ms granularity.
    pub fn schedule(&self) -> ExponentialBackoff {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(self.cap)
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.schedule()
            .nth(retry as usize)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    pub fn decide(&self, progress: &RetryProgress, signal: &FailureSignal) -> RetryDecision {
        match signal {
            FailureSignal::ClientError(_) => RetryDecision::GiveUp,
            FailureSignal::TooManyRequests { retry_after } => {
                if progress.throttles > self.max_throttle_retries {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry(retry_after.unwrap_or(self.throttle_default))
                }
            }
            FailureSignal::NetworkError(_) | FailureSignal::ServerError(_) => {
                if progress.failures >= progress.max_attempts {
                    return RetryDecision::GiveUp;
                }
                let delay = self.backoff_delay(progress.failures.saturating_sub(1));
                RetryDecision::Retry(delay + self.random_jitter())
            }
        }
    }

    fn random_jitter(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_micros()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            Duration::ZERO,
            Duration::from_secs(1),
            10,
        )
    }

    fn progress(failures: u32, throttles: u32, max_attempts: u32) -> RetryProgress {
        RetryProgress {
            failures,
            throttles,
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = no_jitter();
        let delays: Vec<u64> = (0..8).map(|n| policy.backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(250),
            Duration::from_secs(10),
            Duration::ZERO,
            Duration::from_secs(1),
            10,
        );
        let mut previous = Duration::ZERO;
        for retry in 0..64 {
            let delay = policy.backoff_delay(retry);
            assert!(delay >= previous, "retry {} went from {:?} to {:?}", retry, previous, delay);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = BackoffPolicy::default();
        for _ in 0..200 {
            match policy.decide(&progress(1, 0, 5), &FailureSignal::ServerError(500)) {
                RetryDecision::Retry(delay) => {
                    assert!(delay >= Duration::from_secs(1));
                    assert!(delay <= Duration::from_millis(1200));
                }
                RetryDecision::GiveUp => panic!("should retry"),
            }
        }
    }

    #[test]
    fn test_client_error_never_retried() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(&progress(0, 0, 5), &FailureSignal::ClientError(404)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_server_error_exhausts_attempts() {
        let policy = no_jitter();
        let signal = FailureSignal::ServerError(503);
        assert_eq!(
            policy.decide(&progress(1, 0, 2), &signal),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(policy.decide(&progress(2, 0, 2), &signal), RetryDecision::GiveUp);
        assert_eq!(policy.decide(&progress(1, 0, 1), &signal), RetryDecision::GiveUp);
    }

    #[test]
    fn test_network_error_backs_off() {
        let policy = no_jitter();
        let signal = FailureSignal::NetworkError("connection refused".into());
        assert_eq!(
            policy.decide(&progress(3, 0, 5), &signal),
            RetryDecision::Retry(Duration::from_secs(4))
        );
    }

    #[test]
    fn test_throttle_uses_retry_after() {
        let policy = no_jitter();
        let signal = FailureSignal::TooManyRequests {
            retry_after: Some(Duration::from_secs(3)),
        };
        // Exhausted network attempts do not stop a throttle retry
        assert_eq!(
            policy.decide(&progress(5, 1, 5), &signal),
            RetryDecision::Retry(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_throttle_default_wait_and_cap() {
        let policy = no_jitter();
        let signal = FailureSignal::TooManyRequests { retry_after: None };
        assert_eq!(
            policy.decide(&progress(0, 10, 5), &signal),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(policy.decide(&progress(0, 11, 5), &signal), RetryDecision::GiveUp);
    }
}
