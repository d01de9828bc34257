//! Error handling and dispatch statistics.
//!
//! This module provides:
//! - Error type definitions (caller-visible, transport, configuration, initialization)
//! - The terminal failure taxonomy used for statistics
//! - The `MetricsSink` observability hook and the default `DispatchStats` counters

mod stats;
mod types;

// Re-export public API
pub(crate) use stats::MetricsFanout;
pub use stats::{DispatchEvent, DispatchStats, MetricsSink, WaitKind};
pub use types::{ConfigError, DispatchError, FailureKind, InitializationError, TransportError};
