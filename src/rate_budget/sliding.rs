//! Advisory sliding-window limiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::time::Instant;

use super::window::RateWindow;

/// Non-blocking limiter over a log of recent admissions.
///
/// Used as a secondary check in front of the hard [`RateBudget`](super::RateBudget):
/// a denial costs the caller a short pause and never consumes a hard token.
pub struct SlidingWindowLimiter {
    window: RateWindow,
    stamps: Mutex<VecDeque<Instant>>,
    hits: AtomicU64,
}

impl SlidingWindowLimiter {
    pub fn new(window: RateWindow) -> Self {
        SlidingWindowLimiter {
            window,
            stamps: Mutex::new(VecDeque::with_capacity(window.capacity() as usize)),
            hits: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> RateWindow {
        self.window
    }

    /// Records an admission and returns `true` if the window has room.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub(crate) fn allow_at(&self, now: Instant) -> bool {
        let mut stamps = self
            .stamps
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Remove old entries outside the time window
        while let Some(&front) = stamps.front() {
            if now.saturating_duration_since(front) >= self.window.duration() {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() < self.window.capacity() as usize {
            stamps.push_back(now);
            true
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Number of denied checks so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_allows_up_to_capacity() {
        let limiter = SlidingWindowLimiter::new(RateWindow::per_seconds(3, 60).unwrap());
        let now = Instant::now();
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(limiter.allow_at(now));
        assert!(!limiter.allow_at(now));
        assert!(!limiter.allow_at(now + Duration::from_secs(59)));
        assert_eq!(limiter.hits(), 2);
    }

    #[test]
    fn test_slides_old_entries_out() {
        let limiter = SlidingWindowLimiter::new(RateWindow::per_seconds(2, 10).unwrap());
        let start = Instant::now();
        assert!(limiter.allow_at(start));
        assert!(limiter.allow_at(start + Duration::from_secs(5)));
        assert!(!limiter.allow_at(start + Duration::from_secs(9)));

        // The first entry leaves the window at 10s, the second at 15s
        assert!(limiter.allow_at(start + Duration::from_secs(10)));
        assert!(!limiter.allow_at(start + Duration::from_secs(14)));
        assert!(limiter.allow_at(start + Duration::from_secs(15)));
        assert_eq!(limiter.hits(), 2);
    }
}
