//! Rate windows and their per-window token state.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::error_handling::ConfigError;

/// An immutable rule: at most `capacity` units in any `duration` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    duration: Duration,
    capacity: u32,
}

impl RateWindow {
    pub fn new(capacity: u32, duration: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 || duration.is_zero() {
            return Err(ConfigError::InvalidRateWindow(format!(
                "{}:{}",
                capacity,
                duration.as_secs_f64()
            )));
        }
        Ok(RateWindow { duration, capacity })
    }

    /// Convenience constructor for whole-second windows.
    pub fn per_seconds(capacity: u32, seconds: u64) -> Result<Self, ConfigError> {
        Self::new(capacity, Duration::from_secs(seconds))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Time it takes to earn one token, rounded up to the next nanosecond.
    pub fn refill_interval(&self) -> Duration {
        let nanos = self.duration.as_nanos().div_ceil(u128::from(self.capacity));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Parses a comma-separated list such as `"20:1,100:120"`.
    pub fn parse_list(input: &str) -> Result<Vec<RateWindow>, ConfigError> {
        let windows = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<RateWindow>, ConfigError>>()?;
        if windows.is_empty() {
            return Err(ConfigError::NoRateWindows);
        }
        Ok(windows)
    }
}

impl FromStr for RateWindow {
    type Err = ConfigError;

    /// Parses `"<capacity>:<seconds>"`; seconds may be fractional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRateWindow(s.to_string());
        let (capacity, seconds) = s.trim().split_once(':').ok_or_else(invalid)?;
        let capacity: u32 = capacity.trim().parse().map_err(|_| invalid())?;
        let seconds: f64 = seconds.trim().parse().map_err(|_| invalid())?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(invalid());
        }
        let duration = Duration::try_from_secs_f64(seconds).map_err(|_| invalid())?;
        RateWindow::new(capacity, duration).map_err(|_| invalid())
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.duration.subsec_nanos() == 0 {
            write!(f, "{}:{}", self.capacity, self.duration.as_secs())
        } else {
            write!(f, "{}:{}", self.capacity, self.duration.as_secs_f64())
        }
    }
}

/// Mutable accounting for one window.
///
/// Two constraints are tracked together. The token bucket holds whole tokens
/// and refills `capacity` per `duration`, carrying partial progress in
/// `last_refill`. The grant log keeps the instants of grants still inside the
/// rolling interval, so no `duration`-long span ever sees more than
/// `capacity` grants even right after a refill.
#[derive(Debug)]
pub(crate) struct WindowState {
    available: u32,
    last_refill: Instant,
    grants: VecDeque<Instant>,
}

impl WindowState {
    pub(crate) fn full(window: &RateWindow, now: Instant) -> Self {
        WindowState {
            available: window.capacity,
            last_refill: now,
            grants: VecDeque::with_capacity(window.capacity as usize),
        }
    }

    pub(crate) fn available(&self) -> u32 {
        self.available
    }

    /// Adds whole tokens earned since `last_refill`.
    ///
    /// `last_refill` moves forward by the time value of the tokens granted,
    /// not to `now`, unless the bucket is full.
    pub(crate) fn refill(&mut self, window: &RateWindow, now: Instant) {
        if self.available >= window.capacity {
            self.available = window.capacity;
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_nanos();
        let window_nanos = window.duration.as_nanos();
        let capacity = u128::from(window.capacity);
        let earned = elapsed * capacity / window_nanos;
        if earned == 0 {
            return;
        }

        let refilled = (u128::from(self.available) + earned).min(capacity);
        // refilled <= capacity, which is a u32
        self.available = refilled as u32;
        if self.available == window.capacity {
            self.last_refill = now;
        } else {
            let consumed = (earned * window_nanos).div_ceil(capacity);
            self.last_refill += Duration::from_nanos(u64::try_from(consumed).unwrap_or(u64::MAX));
        }
    }

    fn evict(&mut self, window: &RateWindow, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if now.saturating_duration_since(oldest) >= window.duration {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Refreshes the state and returns how long until this window admits a
    /// unit, or zero if it admits one now.
    pub(crate) fn wait_at(&mut self, window: &RateWindow, now: Instant) -> Duration {
        self.refill(window, now);
        self.evict(window, now);

        let bucket_wait = if self.available >= 1 {
            Duration::ZERO
        } else {
            (self.last_refill + window.refill_interval()).saturating_duration_since(now)
        };
        let log_wait = match self.grants.front() {
            Some(&oldest) if self.grants.len() >= window.capacity as usize => {
                (oldest + window.duration).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        };
        bucket_wait.max(log_wait)
    }

    /// Takes one token. Callers must have seen `wait_at` return zero.
    pub(crate) fn consume(&mut self, now: Instant) {
        self.available = self.available.saturating_sub(1);
        self.grants.push_back(now);
    }

    /// Lowers the available tokens to at most `remaining`.
    pub(crate) fn cap_available(&mut self, remaining: u32) {
        self.available = self.available.min(remaining);
    }
}
