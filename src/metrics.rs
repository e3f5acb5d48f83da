// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the retry queue.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `retry_queue_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: add, get_all, get_by_fingerprint, update, remove, clear, count
//! - `outcome`: success, retry, exhausted

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// ENQUEUE PATH
// ═══════════════════════════════════════════════════════════════════════════

/// A failed request was persisted for retry
pub fn record_queued() {
    counter!("retry_queue_queued_total").increment(1);
}

/// A failed request was not queued because an identical one is pending
pub fn record_duplicate_suppressed() {
    counter!("retry_queue_duplicates_suppressed_total").increment(1);
}

/// The immediate attempt failed at the transport layer
pub fn record_transport_failure(kind: &str) {
    counter!(
        "retry_queue_transport_failures_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════

/// One retry attempt finished with `outcome` (success, retry, exhausted)
pub fn record_retry_attempt(outcome: &str) {
    counter!(
        "retry_queue_retry_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Queue depth seen at flush start
pub fn set_queue_depth(depth: usize) {
    gauge!("retry_queue_depth").set(depth as f64);
}

/// Wall time of one flush pass
pub fn record_flush_duration(duration: Duration) {
    histogram!("retry_queue_flush_seconds").record(duration.as_secs_f64());
}

/// A flush pass stopped early because the scheduler was paused
pub fn record_flush_interrupted() {
    counter!("retry_queue_flush_interrupted_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STORAGE
// ═══════════════════════════════════════════════════════════════════════════

/// A storage operation failed
pub fn record_storage_error(operation: &str) {
    counter!(
        "retry_queue_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// 1 once the resilient store has failed over to its fallback
pub fn set_storage_fallback(active: bool) {
    gauge!("retry_queue_storage_fallback").set(if active { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_calls_without_recorder() {
        record_queued();
        record_duplicate_suppressed();
        record_transport_failure("connect");
        record_retry_attempt("success");
        set_queue_depth(3);
        record_flush_duration(Duration::from_millis(12));
        record_flush_interrupted();
        record_storage_error("add");
        set_storage_fallback(true);
    }

    #[test]
    fn test_counters_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_queued();
            record_queued();
            record_retry_attempt("exhausted");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let queued = snapshot
            .iter()
            .find(|(key, ..)| key.key().name() == "retry_queue_queued_total")
            .map(|(.., value)| value);
        assert_eq!(queued, Some(&DebugValue::Counter(2)));

        let exhausted = snapshot.iter().any(|(key, ..)| {
            key.key().name() == "retry_queue_retry_attempts_total"
                && key.key().labels().any(|l| l.key() == "outcome" && l.value() == "exhausted")
        });
        assert!(exhausted);
    }
}
