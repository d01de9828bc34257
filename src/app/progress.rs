//! Progress and ETA reporting.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::time::Instant;

use crate::error_handling::{DispatchStats, WaitKind};
use crate::rate_budget::RateBudget;

/// Tracks a batch against the dispatcher's counters and estimates time left.
pub struct ProgressTracker {
    started: Instant,
    total: usize,
    stats: Arc<DispatchStats>,
    budget: Arc<RateBudget>,
}

impl ProgressTracker {
    pub fn new(total: usize, stats: Arc<DispatchStats>, budget: Arc<RateBudget>) -> Self {
        ProgressTracker {
            started: Instant::now(),
            total,
            stats,
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Requests whose caller has an outcome. A caller timeout counts here.
    pub fn completed(&self) -> usize {
        self.stats.completed()
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed())
    }

    /// Estimated time until every request completes.
    ///
    /// Uses the observed completion rate once there is one, but never less than
    /// the rate windows need to grant what is left.
    pub fn eta(&self) -> Duration {
        estimate_eta(
            self.elapsed(),
            self.completed(),
            self.remaining(),
            self.budget.min_duration_for(self.remaining() as u64),
        )
    }

    pub fn log_progress(&self) {
        let elapsed = self.elapsed();
        let completed = self.completed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            completed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            "Completed {}/{} requests (~{:.2} req/s, avg latency {:?}, avg budget wait {:?}, avg backoff {:?}) | {}",
            completed,
            self.total,
            rate,
            self.stats.average_wait(WaitKind::Request),
            self.stats.average_wait(WaitKind::Budget),
            self.stats.average_wait(WaitKind::Backoff),
            format_timing(elapsed, self.eta())
        );
    }
}

fn estimate_eta(
    elapsed: Duration,
    completed: usize,
    remaining: usize,
    budget_floor: Duration,
) -> Duration {
    if remaining == 0 {
        return Duration::ZERO;
    }
    if completed == 0 {
        return budget_floor;
    }
    let observed = elapsed.mul_f64(remaining as f64 / completed as f64);
    observed.max(budget_floor)
}

/// `Elapsed: 1m05s | ETA: ~2m00s | Total: ~3m05s`
pub fn format_timing(elapsed: Duration, eta: Duration) -> String {
    format!(
        "Elapsed: {} | ETA: ~{} | Total: ~{}",
        minutes_seconds(elapsed),
        minutes_seconds(eta),
        minutes_seconds(elapsed + eta)
    )
}

fn minutes_seconds(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m{:02}s", secs / 60, secs % 60)
}
