//! Dispatch statistics tracking.
//!
//! This module provides the observability hook for the dispatcher: a
//! `MetricsSink` trait that external collaborators can implement, and
//! `DispatchStats`, the thread-safe counter set every dispatcher keeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strum::IntoEnumIterator;
use strum_macros::EnumIter as EnumIterMacro;

use super::types::FailureKind;

/// Notable events in the life of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum DispatchEvent {
    /// Accepted into the intake queue.
    Submitted,
    /// Refused at submission (queue full or shutting down).
    Rejected,
    /// Sent to the transport (one per attempt).
    Issued,
    /// Completed with a payload.
    Succeeded,
    /// Completed with a terminal failure.
    Failed,
    /// An attempt failed at the network level.
    NetworkError,
    /// An attempt returned a 5xx.
    ServerError,
    /// An attempt returned a 429.
    Throttled,
    /// An attempt was re-enqueued for another try.
    Retried,
    /// A 200 body was returned as raw text because it was not JSON.
    TextFallback,
    /// The advisory limiter pushed a request back onto the queue.
    AdvisoryDeferred,
    /// A result arrived after its caller stopped waiting and was discarded.
    LateResult,
}

impl DispatchEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchEvent::Submitted => "Submitted",
            DispatchEvent::Rejected => "Rejected at submission",
            DispatchEvent::Issued => "Requests issued",
            DispatchEvent::Succeeded => "Succeeded",
            DispatchEvent::Failed => "Failed",
            DispatchEvent::NetworkError => "Network errors",
            DispatchEvent::ServerError => "Server errors (5xx)",
            DispatchEvent::Throttled => "Throttled (429)",
            DispatchEvent::Retried => "Retried",
            DispatchEvent::TextFallback => "Text fallback",
            DispatchEvent::AdvisoryDeferred => "Advisory limiter hits",
            DispatchEvent::LateResult => "Late results discarded",
        }
    }
}

/// Where a request spent time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum WaitKind {
    /// Waiting on the rate budget before an attempt.
    Budget,
    /// Waiting out a backoff or `Retry-After` before re-enqueueing.
    Backoff,
    /// Time spent inside the transport call.
    Request,
}

impl WaitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitKind::Budget => "Rate budget wait",
            WaitKind::Backoff => "Retry backoff",
            WaitKind::Request => "Request latency",
        }
    }
}

/// Receiver for dispatcher counters and timings.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// worker tasks on every attempt.
pub trait MetricsSink: Send + Sync {
    fn record_event(&self, event: DispatchEvent);

    fn record_failure(&self, kind: FailureKind);

    fn record_wait(&self, kind: WaitKind, elapsed: Duration) {
        let _ = (kind, elapsed);
    }
}

/// Thread-safe dispatch statistics.
///
/// Every event, failure kind and wait kind is initialized to zero on creation,
/// so lookups never miss.
pub struct DispatchStats {
    events: HashMap<DispatchEvent, AtomicUsize>,
    failures: HashMap<FailureKind, AtomicUsize>,
    wait_micros: HashMap<WaitKind, AtomicU64>,
    wait_counts: HashMap<WaitKind, AtomicU64>,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    pub fn new() -> Self {
        DispatchStats {
            events: DispatchEvent::iter()
                .map(|e| (e, AtomicUsize::new(0)))
                .collect(),
            failures: FailureKind::iter()
                .map(|k| (k, AtomicUsize::new(0)))
                .collect(),
            wait_micros: WaitKind::iter().map(|k| (k, AtomicU64::new(0))).collect(),
            wait_counts: WaitKind::iter().map(|k| (k, AtomicU64::new(0))).collect(),
        }
    }

    pub fn event_count(&self, event: DispatchEvent) -> usize {
        self.events
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total time recorded for a wait kind.
    pub fn total_wait(&self, kind: WaitKind) -> Duration {
        let micros = self
            .wait_micros
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0);
        Duration::from_micros(micros)
    }

    /// Mean of the recorded waits for a kind, or zero if none were recorded.
    pub fn average_wait(&self, kind: WaitKind) -> Duration {
        let count = self
            .wait_counts
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0);
        if count == 0 {
            return Duration::ZERO;
        }
        self.total_wait(kind) / u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Requests that reached a terminal state (success or failure).
    pub fn completed(&self) -> usize {
        self.event_count(DispatchEvent::Succeeded) + self.event_count(DispatchEvent::Failed)
    }
}

impl MetricsSink for DispatchStats {
    fn record_event(&self, event: DispatchEvent) {
        if let Some(counter) = self.events.get(&event) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment counter for {:?} which is not in the map. \
                 This indicates a bug in DispatchStats initialization.",
                event
            );
        }
    }

    fn record_failure(&self, kind: FailureKind) {
        if let Some(counter) = self.failures.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment failure counter for {:?} which is not in the map. \
                 This indicates a bug in DispatchStats initialization.",
                kind
            );
        }
    }

    fn record_wait(&self, kind: WaitKind, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if let Some(total) = self.wait_micros.get(&kind) {
            total.fetch_add(micros, Ordering::Relaxed);
        }
        if let Some(count) = self.wait_counts.get(&kind) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Records into the dispatcher's own stats and, if present, an external sink.
#[derive(Clone)]
pub(crate) struct MetricsFanout {
    stats: Arc<DispatchStats>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl MetricsFanout {
    pub(crate) fn new(sink: Option<Arc<dyn MetricsSink>>) -> Self {
        MetricsFanout {
            stats: Arc::new(DispatchStats::new()),
            sink,
        }
    }

    pub(crate) fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn event(&self, event: DispatchEvent) {
        self.stats.record_event(event);
        if let Some(sink) = &self.sink {
            sink.record_event(event);
        }
    }

    pub(crate) fn failure(&self, kind: FailureKind) {
        self.stats.record_event(DispatchEvent::Failed);
        self.stats.record_failure(kind);
        if let Some(sink) = &self.sink {
            sink.record_event(DispatchEvent::Failed);
            sink.record_failure(kind);
        }
    }

    /// A submission refused before it entered the queue.
    pub(crate) fn rejected(&self, kind: FailureKind) {
        self.stats.record_event(DispatchEvent::Rejected);
        self.stats.record_failure(kind);
        if let Some(sink) = &self.sink {
            sink.record_event(DispatchEvent::Rejected);
            sink.record_failure(kind);
        }
    }

    pub(crate) fn wait(&self, kind: WaitKind, elapsed: Duration) {
        self.stats.record_wait(kind, elapsed);
        if let Some(sink) = &self.sink {
            sink.record_wait(kind, elapsed);
        }
    }
}
