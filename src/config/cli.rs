//! Command-line options.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::constants::*;
use crate::config::types::{DispatcherConfig, LogFormat, LogLevel};
use crate::error_handling::ConfigError;
use crate::rate_budget::RateWindow;

/// Command-line options for the `riot_dispatch` binary.
///
/// # Examples
///
/// ```bash
/// # Fetch a single endpoint
/// riot_dispatch https://na1.api.riotgames.com/lol/status/v4/platform-data
///
/// # Fetch every URL in a file with a production key's limits
/// riot_dispatch --input urls.txt --rate-limits 500:10,30000:600 --workers 12
///
/// # Read URLs from stdin and add a query parameter to each
/// cat urls.txt | riot_dispatch --input - --param page=1
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "riot_dispatch",
    version,
    about = "Fetches Riot API URLs through a rate-limited worker pool and prints one JSON line per result."
)]
pub struct Cli {
    /// URLs to fetch
    pub urls: Vec<String>,

    /// File with one URL per line, or '-' for stdin
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Riot API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Worker pool size
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Hard rate limits as <capacity>:<seconds>[,...]
    #[arg(long, default_value = DEFAULT_RATE_LIMITS)]
    pub rate_limits: String,

    /// Attempts per request for network and 5xx failures
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Seconds to wait for each result
    #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT_SECS)]
    pub timeout_seconds: u64,

    /// Transport timeout per HTTP call, in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_seconds: u64,

    /// Intake queue size
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Query parameter added to every request (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Optional advisory limit as <capacity>:<seconds>, e.g. 50:60
    #[arg(long)]
    pub advisory_limit: Option<RateWindow>,

    /// Fail non-JSON 200 responses instead of returning their text
    #[arg(long)]
    pub no_text_fallback: bool,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Builds the dispatcher configuration from the parsed options.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for malformed rate limits or out-of-range values.
    pub fn into_config(&self) -> Result<DispatcherConfig, ConfigError> {
        let config = DispatcherConfig {
            api_key: self.api_key.clone(),
            workers: self.workers,
            rate_windows: RateWindow::parse_list(&self.rate_limits)?,
            max_attempts: self.max_attempts,
            wait_timeout: Duration::from_secs(self.timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            queue_capacity: self.queue_capacity,
            advisory_window: self.advisory_limit,
            text_fallback: !self.no_text_fallback,
            ..DispatcherConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parses `key=value`. The value may be empty or contain further `=`.
pub fn parse_param(input: &str) -> Result<(String, String), ConfigError> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidParam(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("queue=RANKED_SOLO_5x5").unwrap(),
            ("queue".to_string(), "RANKED_SOLO_5x5".to_string())
        );
        assert_eq!(
            parse_param("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("empty=").unwrap().1, "");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn test_into_config_maps_flags() {
        let cli = Cli::try_parse_from([
            "riot_dispatch",
            "--api-key",
            "RGAPI-test",
            "--workers",
            "3",
            "--rate-limits",
            "10:1",
            "--timeout-seconds",
            "7",
            "--advisory-limit",
            "50:60",
            "--no-text-fallback",
            "https://example.com/a",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("RGAPI-test"));
        assert_eq!(config.workers, 3);
        assert_eq!(config.rate_windows, vec![RateWindow::per_seconds(10, 1).unwrap()]);
        assert_eq!(config.wait_timeout, Duration::from_secs(7));
        assert_eq!(
            config.advisory_window,
            Some(RateWindow::per_seconds(50, 60).unwrap())
        );
        assert!(!config.text_fallback);
        assert_eq!(config.max_throttle_retries, MAX_THROTTLE_RETRIES);
    }

    #[test]
    fn test_into_config_rejects_bad_limits() {
        let cli = Cli::try_parse_from(["riot_dispatch", "--rate-limits", "20/1"]).unwrap();
        assert!(matches!(
            cli.into_config(),
            Err(ConfigError::InvalidRateWindow(_))
        ));

        let cli = Cli::try_parse_from(["riot_dispatch", "--workers", "0"]).unwrap();
        assert_eq!(cli.into_config(), Err(ConfigError::NoWorkers));
    }
}
