//! Configuration types.
//!
//! This module defines the log settings shared with the CLI and the
//! dispatcher configuration.

use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::*;
use crate::error_handling::ConfigError;
use crate::rate_budget::RateWindow;
use crate::retry::BackoffPolicy;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// One JSON object per line
    Json,
}

/// Dispatcher settings.
///
/// Plain data with no CLI dependency; the binary builds one from `Cli`, and
/// library users construct it directly or start from `Default`.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Sent as `X-Riot-Token`. Falls back to `RIOT_API_KEY` when `None`.
    pub api_key: Option<String>,
    pub workers: usize,
    /// Hard limits. Every window must admit a request before it is sent.
    pub rate_windows: Vec<RateWindow>,
    /// Default attempt budget for network and 5xx failures.
    pub max_attempts: u32,
    pub max_throttle_retries: u32,
    /// Default caller-side wait for `fetch`.
    pub wait_timeout: Duration,
    /// Transport timeout per HTTP call.
    pub request_timeout: Duration,
    pub queue_capacity: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_jitter: Duration,
    /// 429 wait when `Retry-After` is missing.
    pub throttle_default_wait: Duration,
    /// Optional secondary limiter checked before the hard budget.
    pub advisory_window: Option<RateWindow>,
    /// Return non-JSON 200 bodies as text instead of failing.
    pub text_fallback: bool,
    pub shutdown_grace: Duration,
    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            api_key: None,
            workers: DEFAULT_WORKERS,
            // An unparsable constant leaves this empty and fails validate()
            rate_windows: RateWindow::parse_list(DEFAULT_RATE_LIMITS).unwrap_or_default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_throttle_retries: MAX_THROTTLE_RETRIES,
            wait_timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_cap: Duration::from_secs(BACKOFF_CAP_SECS),
            backoff_jitter: Duration::from_millis(BACKOFF_JITTER_MS),
            throttle_default_wait: Duration::from_secs(THROTTLE_DEFAULT_WAIT_SECS),
            advisory_window: None,
            text_fallback: true,
            shutdown_grace: Duration::from_secs(SHUTDOWN_GRACE_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Checks everything except the API key.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.rate_windows.is_empty() {
            return Err(ConfigError::NoRateWindows);
        }
        if let Some(window) = self
            .rate_windows
            .iter()
            .find(|w| w.capacity() == 0 || w.duration().is_zero())
        {
            return Err(ConfigError::InvalidRateWindow(window.to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Returns the configured key, or `RIOT_API_KEY` from the environment.
    ///
    /// # Errors
    ///
    /// `MissingApiKey` if neither is set or the value is blank.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.backoff_base,
            self.backoff_cap,
            self.backoff_jitter,
            self.throttle_default_wait,
            self.max_throttle_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DispatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 6);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.wait_timeout, Duration::from_secs(120));
        assert!(config.text_fallback);
        assert!(config.user_agent.starts_with("riot_dispatch/"));
    }

    #[test]
    fn test_default_rate_windows_come_from_limits_string() {
        let config = DispatcherConfig::default();
        assert_eq!(
            config.rate_windows,
            vec![
                RateWindow::per_seconds(20, 1).unwrap(),
                RateWindow::per_seconds(100, 120).unwrap()
            ]
        );
        assert_eq!(
            config.rate_windows,
            RateWindow::parse_list(DEFAULT_RATE_LIMITS).unwrap()
        );
    }

    #[test]
    fn test_empty_rate_windows_fail_validation() {
        let config = DispatcherConfig {
            rate_windows: RateWindow::parse_list("20:x").unwrap_or_default(),
            ..DispatcherConfig::default()
        };
        assert!(config.rate_windows.is_empty());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoRateWindows)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            (
                DispatcherConfig {
                    workers: 0,
                    ..Default::default()
                },
                ConfigError::NoWorkers,
            ),
            (
                DispatcherConfig {
                    rate_windows: Vec::new(),
                    ..Default::default()
                },
                ConfigError::NoRateWindows,
            ),
            (
                DispatcherConfig {
                    max_attempts: 0,
                    ..Default::default()
                },
                ConfigError::ZeroAttempts,
            ),
            (
                DispatcherConfig {
                    queue_capacity: 0,
                    ..Default::default()
                },
                ConfigError::ZeroQueueCapacity,
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = DispatcherConfig {
            api_key: Some("  RGAPI-explicit  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().unwrap(), "RGAPI-explicit");

        let blank = DispatcherConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        // A blank explicit key does not fall through to the environment
        assert_eq!(blank.resolve_api_key(), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn test_backoff_policy_uses_config() {
        let config = DispatcherConfig {
            backoff_base: Duration::from_secs(2),
            backoff_jitter: Duration::ZERO,
            ..Default::default()
        };
        let policy = config.backoff_policy();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(4));
    }
}
