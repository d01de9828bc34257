//! Configuration constants.
//!
//! Defaults for the dispatcher and the binary. Every value here can be
//! overridden through `DispatcherConfig` or the CLI.

use std::time::Duration;

/// Environment variable holding the Riot API key.
pub const API_KEY_ENV: &str = "RIOT_API_KEY";

// Worker pool and queue
/// Worker tasks pulling from the intake queue
pub const DEFAULT_WORKERS: usize = 6;
/// Bounded intake queue size; submissions beyond this fail with `QueueFull`
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

// Rate windows
/// Riot development key limits (20 per second, 100 per two minutes) as
/// `"<capacity>:<seconds>"` windows. The only source of the default windows.
pub const DEFAULT_RATE_LIMITS: &str = "20:1,100:120";

// Attempts and timeouts
/// Attempts per request for network and 5xx failures
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// 429 retries per request before giving up
pub const MAX_THROTTLE_RETRIES: u32 = 10;
/// How long a blocking caller waits for a result, in seconds
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 120;
/// Transport timeout for one HTTP call, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Grace period for in-flight requests at shutdown, in seconds
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

// Backoff
/// First retry delay for network and 5xx failures, in milliseconds
pub const BACKOFF_BASE_MS: u64 = 1000;
/// Upper bound on the exponential delay, in seconds
pub const BACKOFF_CAP_SECS: u64 = 30;
/// Maximum random jitter added to each backoff, in milliseconds
pub const BACKOFF_JITTER_MS: u64 = 200;
/// Wait after a 429 that has no usable `Retry-After`, in seconds
pub const THROTTLE_DEFAULT_WAIT_SECS: u64 = 1;

/// Pause before re-enqueueing a request the advisory limiter turned away
pub const ADVISORY_DEFER: Duration = Duration::from_millis(50);

/// Default User-Agent string for HTTP requests.
pub const DEFAULT_USER_AGENT: &str = concat!("riot_dispatch/", env!("CARGO_PKG_VERSION"));

// Input limits
/// Maximum URL length accepted from input files
pub const MAX_URL_LENGTH: usize = 2048;

/// Seconds between progress lines in the binary
pub const LOGGING_INTERVAL_SECS: u64 = 5;
