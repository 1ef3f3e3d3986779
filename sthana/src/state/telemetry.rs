//! Engine counters for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Ingestion counters using atomics for lock-free access
#[derive(Debug, Default)]
pub struct Telemetry {
    /// Measurements accepted for processing
    pub messages: AtomicU64,
    /// Link updates that crossed the move threshold
    pub moved: AtomicU64,
    /// Measurements that failed to parse or validate
    pub malformed: AtomicU64,
    /// Measurements naming an unconfigured receiver
    pub unknown_node: AtomicU64,
    /// Measurements for untracked devices
    pub skipped: AtomicU64,
}

/// Point-in-time copy of [`Telemetry`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Measurements accepted for processing
    pub messages: u64,
    /// Link updates that crossed the move threshold
    pub moved: u64,
    /// Measurements that failed to parse or validate
    pub malformed: u64,
    /// Measurements naming an unconfigured receiver
    pub unknown_node: u64,
    /// Measurements for untracked devices
    pub skipped: u64,
}

impl Telemetry {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            moved: self.moved.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_node: self.unknown_node.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let telemetry = Telemetry::default();
        Telemetry::bump(&telemetry.messages);
        Telemetry::bump(&telemetry.messages);
        Telemetry::bump(&telemetry.malformed);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.messages, 2);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.skipped, 0);
    }
}
