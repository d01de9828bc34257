//! riot_dispatch library: rate-limited concurrent requests to the Riot API
//!
//! Every request goes through one [`Dispatcher`]: a fixed pool of workers that
//! share a [`RateBudget`] built from the key's rate windows (for a development
//! key, 20 requests per second and 100 per two minutes). Failed attempts are
//! classified and retried according to a [`BackoffPolicy`]; 429 responses
//! honour `Retry-After`.
//!
//! # Example
//!
//! ```no_run
//! use riot_dispatch::{Dispatcher, DispatcherConfig, Request};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DispatcherConfig {
//!     api_key: Some("RGAPI-...".to_string()),
//!     ..Default::default()
//! };
//! let dispatcher = Dispatcher::from_config(&config)?;
//!
//! let payload = dispatcher
//!     .fetch(Request::new("https://na1.api.riotgames.com/lol/status/v4/platform-data"))
//!     .await?;
//! println!("{:?}", payload.as_json());
//!
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

mod app;
pub mod config;
mod dispatcher;
mod error_handling;
pub mod initialization;
pub mod rate_budget;
pub mod retry;
pub mod transport;

// Re-export public API
pub use app::{format_timing, validate_url, ProgressTracker};
pub use config::{Cli, DispatcherConfig, LogFormat, LogLevel};
pub use dispatcher::{Dispatcher, Outcome, Payload, PendingHandle, Request, RequestId};
pub use error_handling::{
    ConfigError, DispatchError, DispatchEvent, DispatchStats, FailureKind, InitializationError,
    MetricsSink, TransportError, WaitKind,
};
pub use rate_budget::{RateBudget, RateWindow, ServerThrottleState, SlidingWindowLimiter};
pub use retry::{BackoffPolicy, FailureSignal, RetryDecision};
pub use run::{run_batch, run_batch_with, BatchInput, BatchReport};
pub use transport::{HttpTransport, RawResponse, Transport, TransportRequest};

// Batch runner behind the CLI
mod run {
    mod input;

    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use futures::StreamExt;
    use log::info;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::app::{print_dispatch_statistics, shutdown_gracefully, ProgressTracker};
    use crate::config::{Cli, LOGGING_INTERVAL_SECS};
    use crate::dispatcher::{Dispatcher, Outcome, Request};

    pub use input::{collect_urls, BatchInput};

    /// Results of a batch run.
    #[derive(Debug, Clone, PartialEq)]
    pub struct BatchReport {
        /// URLs dispatched
        pub total: usize,
        /// Requests that produced a payload
        pub succeeded: usize,
        /// Requests that ended in an error
        pub failed: usize,
        /// Input lines rejected before dispatch
        pub skipped: usize,
        /// Elapsed time in seconds
        pub elapsed_seconds: f64,
    }

    /// Runs the batch described by the command line, writing JSON lines to stdout.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, a missing API key, an unreadable input file, or
    /// if stdout cannot be written. Individual request failures are reported in
    /// the output and counted, not returned.
    pub async fn run_batch(cli: &Cli) -> Result<BatchReport> {
        let config = cli.into_config().context("Invalid configuration")?;
        let input = collect_urls(&cli.urls, cli.input.as_deref()).await?;
        if input.urls.is_empty() {
            anyhow::bail!("No valid URLs to fetch");
        }

        let dispatcher =
            Dispatcher::from_config(&config).context("Failed to start dispatcher")?;

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut report = run_batch_with(
            &dispatcher,
            input.urls,
            &cli.params,
            config.workers,
            &mut out,
        )
        .await?;
        report.skipped = input.skipped;
        Ok(report)
    }

    /// Fetches `urls` through `dispatcher`, writing one JSON line per URL in input order.
    ///
    /// At most `in_flight` requests are outstanding at once, capped at the
    /// dispatcher's worker count. Each request may wait for the dispatcher's
    /// caller timeout plus the longest rate window, so a request queued behind
    /// an exhausted window still completes. The dispatcher is shut down when
    /// the batch finishes.
    pub async fn run_batch_with<W: Write>(
        dispatcher: &Dispatcher,
        urls: Vec<String>,
        params: &[(String, String)],
        in_flight: usize,
        out: &mut W,
    ) -> Result<BatchReport> {
        let start_time = std::time::Instant::now();
        let total = urls.len();
        info!("Dispatching {} request(s)", total);

        let tracker = Arc::new(ProgressTracker::new(
            total,
            dispatcher.stats(),
            Arc::clone(dispatcher.budget()),
        ));

        let cancel = CancellationToken::new();
        let cancel_logging = cancel.child_token();
        let logging_task = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(LOGGING_INTERVAL_SECS));
                // The first tick completes immediately
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => tracker.log_progress(),
                        _ = cancel_logging.cancelled() => break,
                    }
                }
            })
        };

        let in_flight = in_flight.clamp(1, dispatcher.pool_size().max(1));
        let timeout = batch_wait_timeout(dispatcher);
        let mut results = futures::stream::iter(urls)
            .map(|url| {
                let request = Request::new(url.clone())
                    .params(params.iter().cloned())
                    .timeout(timeout);
                async move {
                    let outcome = dispatcher.fetch(request).await;
                    (url, outcome)
                }
            })
            .buffered(in_flight);

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut write_result = Ok(());
        while let Some((url, outcome)) = results.next().await {
            if outcome.is_ok() {
                succeeded += 1;
            } else {
                failed += 1;
            }
            write_result = writeln!(out, "{}", result_line(&url, &outcome));
            if write_result.is_err() {
                break;
            }
        }
        drop(results);

        shutdown_gracefully(dispatcher, cancel, Some(logging_task)).await;
        write_result.context("Failed to write result")?;
        out.flush().context("Failed to flush output")?;

        tracker.log_progress();
        let elapsed = start_time.elapsed();
        print_dispatch_statistics(&dispatcher.stats(), elapsed);

        Ok(BatchReport {
            total,
            succeeded,
            failed,
            skipped: 0,
            elapsed_seconds: elapsed.as_secs_f64(),
        })
    }

    /// Caller timeout for batch requests: the dispatcher's own plus the longest
    /// rate window.
    fn batch_wait_timeout(dispatcher: &Dispatcher) -> Duration {
        let longest_window = dispatcher
            .budget()
            .windows()
            .iter()
            .map(|window| window.duration())
            .max()
            .unwrap_or_default();
        dispatcher.wait_timeout() + longest_window
    }

    fn result_line(url: &str, outcome: &Outcome) -> serde_json::Value {
        match outcome {
            Ok(payload) => json!({ "url": url, "ok": true, "data": payload }),
            Err(e) => json!({
                "url": url,
                "ok": false,
                "kind": e.kind().as_str(),
                "error": e.to_string(),
            }),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::dispatcher::Payload;
        use crate::error_handling::DispatchError;

        #[test]
        fn test_result_line_success() {
            let outcome: Outcome = Ok(Payload::Json(json!({ "tier": "CHALLENGER" })));
            let line = result_line("https://example.com/a", &outcome);
            assert_eq!(line["ok"], true);
            assert_eq!(line["data"]["tier"], "CHALLENGER");
        }

        #[test]
        fn test_result_line_text_payload() {
            let outcome: Outcome = Ok(Payload::Text("plain".to_string()));
            let line = result_line("https://example.com/a", &outcome);
            assert_eq!(line["data"], "plain");
        }

        #[test]
        fn test_result_line_failure() {
            let outcome: Outcome = Err(DispatchError::ClientError {
                status: 404,
                body: "not found".to_string(),
            });
            let line = result_line("https://example.com/a", &outcome);
            assert_eq!(line["ok"], false);
            assert_eq!(line["kind"], "Client error (4xx)");
            assert!(line["error"].as_str().unwrap().contains("404"));
        }
    }
}
