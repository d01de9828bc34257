//! Statistics printing.

use std::time::Duration;

use log::info;
use strum::IntoEnumIterator;

use crate::error_handling::{DispatchEvent, DispatchStats, FailureKind, WaitKind};

/// Logs every non-zero dispatch counter, failure kind and wait total.
pub fn print_dispatch_statistics(stats: &DispatchStats, elapsed: Duration) {
    info!(
        "Dispatched {} request(s) in {:.1}s: {} succeeded, {} failed",
        stats.event_count(DispatchEvent::Submitted),
        elapsed.as_secs_f64(),
        stats.event_count(DispatchEvent::Succeeded),
        stats.event_count(DispatchEvent::Failed)
    );

    info!("Event Counts:");
    for event in DispatchEvent::iter() {
        let count = stats.event_count(event);
        if count > 0 {
            info!("   {}: {}", event.as_str(), count);
        }
    }

    let total_failures = stats.total_failures();
    if total_failures > 0 {
        info!("Failure Counts ({} total):", total_failures);
        for kind in FailureKind::iter() {
            let count = stats.failure_count(kind);
            if count > 0 {
                info!("   {}: {}", kind.as_str(), count);
            }
        }
    }

    for kind in WaitKind::iter() {
        let total = stats.total_wait(kind);
        if !total.is_zero() {
            info!(
                "{}: total {:.1}s, average {:?}",
                kind.as_str(),
                total.as_secs_f64(),
                stats.average_wait(kind)
            );
        }
    }
}
