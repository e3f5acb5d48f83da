// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The retry scheduler: drains the queue in FIFO order.
//!
//! # Flush
//!
//! ```text
//!  flush() ──► paused or running? ──yes──► None
//!                 │ no
//!                 ▼
//!            running = true (cleared by guard on every exit)
//!            snapshot = get_all()            ── flushStart{queue_size}
//!                 │
//!                 ▼
//!   ┌──► next record ── paused? ──yes──► stop
//!   │        │ no
//!   │        ▼                           ── retry{record, attempt}
//!   │     send (with Idempotency-Key)
//!   │        ├─ Ok  ─► remove            ── success{record, response}
//!   │        └─ Err ─► retries + 1
//!   │               ├─ exhausted ─► remove ── failure{record, error}
//!   │               └─ else ─► update, sleep(base * 2^retries)
//!   └────────┘
//!                 │
//!                 ▼                      ── flushComplete{processed, failed}
//! ```
//!
//! Attempts are strictly sequential. Pause is cooperative and only checked
//! between records; an attempt already in flight always completes. Backoff
//! only delays this loop, never callers of the executor.

mod types;

pub use types::{FlushSummary, SchedulerState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::events::{Event, EventBus};
use crate::request::QueuedRequest;
use crate::resilience::retry::backoff_delay;
use crate::storage::traits::QueueStore;
use crate::transport::Transport;

pub struct RetryScheduler {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    base_delay: Duration,
    running: AtomicBool,
    paused: AtomicBool,
    verbose: bool,
}

impl RetryScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
        bus: Arc<EventBus>,
        base_delay: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            bus,
            base_delay,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            verbose: false,
        }
    }

    /// Promote per-request lifecycle logs to `info`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_flags(self.is_running(), self.is_paused())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop an in-flight flush at the next record and block new ones.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!(running = self.is_running(), "Retry scheduler paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("Retry scheduler resumed");
        }
    }

    /// Run one pass over the current queue.
    ///
    /// Returns `None` without doing anything if a flush is already running
    /// or the scheduler is paused. Per-record failures never surface here;
    /// they become events and counters.
    pub async fn flush(&self) -> Option<FlushSummary> {
        if self.is_paused() {
            lifecycle!(self.verbose, "Flush skipped: scheduler paused");
            return None;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            lifecycle!(self.verbose, "Flush skipped: already running");
            return None;
        }
        let _guard = FlushGuard(&self.running);

        let start = Instant::now();
        let snapshot = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to read retry queue, nothing to flush");
                crate::metrics::record_storage_error("get_all");
                Vec::new()
            }
        };

        let mut summary = FlushSummary {
            queue_size: snapshot.len(),
            ..Default::default()
        };
        crate::metrics::set_queue_depth(summary.queue_size);
        self.bus.publish(&Event::FlushStart {
            queue_size: summary.queue_size,
        });

        if !snapshot.is_empty() {
            info!(queue_size = summary.queue_size, "Flushing retry queue");
        }

        for record in snapshot {
            if self.is_paused() {
                summary.interrupted = true;
                crate::metrics::record_flush_interrupted();
                break;
            }
            self.attempt(record, &mut summary).await;
        }

        self.bus.publish(&Event::FlushComplete {
            processed: summary.processed,
            failed: summary.failed,
        });
        crate::metrics::record_flush_duration(start.elapsed());

        if summary.queue_size > 0 {
            info!(
                processed = summary.processed,
                failed = summary.failed,
                exhausted = summary.exhausted,
                remaining = summary.skipped(),
                interrupted = summary.interrupted,
                "Flush complete"
            );
        }
        Some(summary)
    }

    /// Send one record and settle its outcome.
    async fn attempt(&self, record: QueuedRequest, summary: &mut FlushSummary) {
        self.bus.publish(&Event::Retry {
            record: record.clone(),
            attempt: record.attempt(),
        });

        let error = match self.transport.send(&record.to_outbound()).await {
            Ok(response) => {
                self.remove(&record).await;
                summary.processed += 1;
                crate::metrics::record_retry_attempt("success");
                lifecycle!(self.verbose, id = %record.id, status = response.status, "Queued request delivered");
                self.bus.publish(&Event::Success { record, response });
                return;
            }
            Err(e) => e,
        };

        summary.failed += 1;
        let prior_retries = record.retries;
        let record = record.with_failed_attempt();

        if record.is_exhausted() {
            self.remove(&record).await;
            summary.exhausted += 1;
            crate::metrics::record_retry_attempt("exhausted");
            warn!(
                id = %record.id,
                url = %record.url,
                retries = record.retries,
                error = %error,
                "Retries exhausted, dropping queued request"
            );
            self.bus.publish(&Event::Failure { record, error });
            return;
        }

        if let Err(e) = self.store.update(&record).await {
            warn!(id = %record.id, error = %e, "Failed to record retry attempt");
            crate::metrics::record_storage_error("update");
        }
        crate::metrics::record_retry_attempt("retry");

        let delay = backoff_delay(self.base_delay, prior_retries);
        lifecycle!(
            self.verbose,
            id = %record.id,
            retries = record.retries,
            max_retries = record.max_retries,
            error = %error,
            backoff = ?delay,
            "Retry failed, backing off"
        );
        sleep(delay).await;
    }

    async fn remove(&self, record: &QueuedRequest) {
        if let Err(e) = self.store.remove(&record.id).await {
            warn!(id = %record.id, error = %e, "Failed to remove queued request");
            crate::metrics::record_storage_error("remove");
        }
    }
}

/// Clears the running flag when a flush exits, however it exits.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::request::{RequestConfig, IDEMPOTENCY_HEADER};
    use crate::storage::memory::MemoryStore;
    use crate::transport::{OutboundRequest, Response, TransportError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Fails for URLs in `failing`, succeeds otherwise. Records every send.
    #[derive(Default)]
    struct MockTransport {
        failing: Mutex<HashSet<String>>,
        sent: Mutex<Vec<OutboundRequest>>,
    }

    impl MockTransport {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: Mutex::new(urls.iter().map(|u| u.to_string()).collect()),
                ..Default::default()
            }
        }

        fn sent_urls(&self) -> Vec<String> {
            self.sent.lock().iter().map(|r| r.url.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: &OutboundRequest) -> Result<Response, TransportError> {
            self.sent.lock().push(request.clone());
            if self.failing.lock().contains(&request.url) {
                Err(TransportError::Connect("offline".into()))
            } else {
                Ok(Response::new(200))
            }
        }
    }

    /// Parks every send until released.
    struct GatedTransport {
        entered: Notify,
        release: Notify,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: &OutboundRequest) -> Result<Response, TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Response::new(200))
        }
    }

    fn record(url: &str, retries: u32, max_retries: u32) -> QueuedRequest {
        let mut record = QueuedRequest::new(&RequestConfig::post(url), format!("fp-{url}"), max_retries);
        record.retries = retries;
        record
    }

    fn scheduler(
        store: Arc<MemoryStore>,
        transport: Arc<dyn Transport>,
        base_delay: Duration,
    ) -> (Arc<RetryScheduler>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let scheduler = RetryScheduler::new(store, transport, bus.clone(), base_delay);
        (Arc::new(scheduler), bus)
    }

    fn collect(bus: &EventBus, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        bus.subscribe(kind, move |e| events_clone.lock().push(e.clone()));
        events
    }

    #[tokio::test]
    async fn test_empty_queue_publishes_start_and_complete() {
        let store = Arc::new(MemoryStore::new());
        let (scheduler, bus) = scheduler(store, Arc::new(MockTransport::default()), Duration::ZERO);
        let starts = collect(&bus, EventKind::FlushStart);
        let completes = collect(&bus, EventKind::FlushComplete);

        let summary = scheduler.flush().await.unwrap();

        assert_eq!(summary, FlushSummary::default());
        assert!(matches!(starts.lock()[0], Event::FlushStart { queue_size: 0 }));
        assert!(matches!(completes.lock()[0], Event::FlushComplete { processed: 0, failed: 0 }));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_success_removes_record() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/a", 0, 5)).await.unwrap();
        let transport = Arc::new(MockTransport::default());
        let (scheduler, bus) = scheduler(store.clone(), transport.clone(), Duration::ZERO);
        let retries = collect(&bus, EventKind::Retry);
        let successes = collect(&bus, EventKind::Success);

        let summary = scheduler.flush().await.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);
        assert!(store.is_empty());
        assert!(matches!(retries.lock()[0], Event::Retry { attempt: 1, .. }));
        assert_eq!(successes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_carries_idempotency_key() {
        let store = Arc::new(MemoryStore::new());
        let config = RequestConfig::post("/pay").idempotency_key("pay-7");
        store.add(&QueuedRequest::new(&config, "fp".into(), 5)).await.unwrap();
        let transport = Arc::new(MockTransport::default());
        let (scheduler, _bus) = scheduler(store, transport.clone(), Duration::ZERO);

        scheduler.flush().await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].header(IDEMPOTENCY_HEADER), Some("pay-7"));
    }

    #[tokio::test]
    async fn test_fifo_order_regardless_of_insertion() {
        let store = Arc::new(MemoryStore::new());
        let first = record("/first", 0, 5);
        let second = record("/second", 0, 5);
        let third = record("/third", 0, 5);
        for r in [&third, &first, &second] {
            store.add(r).await.unwrap();
        }
        let transport = Arc::new(MockTransport::default());
        let (scheduler, _bus) = scheduler(store, transport.clone(), Duration::ZERO);

        scheduler.flush().await.unwrap();

        assert_eq!(transport.sent_urls(), vec!["/first", "/second", "/third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_below_limit_updates_and_keeps_record() {
        let store = Arc::new(MemoryStore::new());
        let r = record("/down", 2, 5);
        store.add(&r).await.unwrap();
        let (scheduler, bus) = scheduler(store.clone(), Arc::new(MockTransport::failing(&["/down"])), Duration::from_millis(10));
        let failures = collect(&bus, EventKind::Failure);

        let summary = scheduler.flush().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exhausted, 0);
        assert_eq!(store.get_by_id(&r.id).await.unwrap().unwrap().retries, 3);
        assert!(failures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_last_allowed_failure_removes_and_publishes_failure() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/down", 4, 5)).await.unwrap();
        let (scheduler, bus) = scheduler(store.clone(), Arc::new(MockTransport::failing(&["/down"])), Duration::from_secs(60));
        let failures = collect(&bus, EventKind::Failure);
        let completes = collect(&bus, EventKind::FlushComplete);

        // No backoff after exhaustion, so this returns without waiting
        let summary = scheduler.flush().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exhausted, 1);
        assert!(store.is_empty());

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            Event::Failure { record, error } => {
                assert_eq!(record.retries, 5);
                assert!(matches!(error, TransportError::Connect(_)));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(completes.lock()[0], Event::FlushComplete { processed: 0, failed: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_base_times_two_pow_retries() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/down", 1, 5)).await.unwrap();
        let (scheduler, _bus) = scheduler(store, Arc::new(MockTransport::failing(&["/down"])), Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        scheduler.flush().await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(210), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_per_failing_record() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/a", 0, 5)).await.unwrap();
        store.add(&record("/ok", 0, 5)).await.unwrap();
        store.add(&record("/b", 2, 5)).await.unwrap();
        let transport = Arc::new(MockTransport::failing(&["/a", "/b"]));
        let (scheduler, _bus) = scheduler(store.clone(), transport, Duration::from_millis(100));

        let start = tokio::time::Instant::now();
        let summary = scheduler.flush().await.unwrap();
        let elapsed = start.elapsed();

        // 100 * 2^0 + 100 * 2^2
        assert!(elapsed >= Duration::from_millis(500), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(520), "waited {elapsed:?}");
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_pause_mid_flush_leaves_remaining_records() {
        let store = Arc::new(MemoryStore::new());
        let records: Vec<_> = (0..5).map(|i| record(&format!("/item/{i}"), 0, 5)).collect();
        for r in &records {
            store.add(r).await.unwrap();
        }
        let transport = Arc::new(MockTransport::default());
        let (scheduler, bus) = scheduler(store.clone(), transport.clone(), Duration::ZERO);

        // Pause while item 1 (0-based) is being attempted
        let pauser = scheduler.clone();
        bus.subscribe(EventKind::Retry, move |event| {
            if event.record().is_some_and(|r| r.url == "/item/1") {
                pauser.pause();
            }
        });

        let summary = scheduler.flush().await.unwrap();

        // The in-flight attempt completes, nothing after it is tried
        assert_eq!(transport.sent_urls(), vec!["/item/0", "/item/1"]);
        assert_eq!(summary.processed, 2);
        assert!(summary.interrupted);
        assert_eq!(summary.skipped(), 3);

        let remaining: Vec<_> = store.get_all().await.unwrap().into_iter().map(|r| r.url).collect();
        assert_eq!(remaining, vec!["/item/2", "/item/3", "/item/4"]);
        assert_eq!(scheduler.state(), SchedulerState::Paused);
    }

    #[tokio::test]
    async fn test_paused_flush_is_noop_until_resumed() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/a", 0, 5)).await.unwrap();
        let transport = Arc::new(MockTransport::default());
        let (scheduler, bus) = scheduler(store.clone(), transport.clone(), Duration::ZERO);
        let starts = collect(&bus, EventKind::FlushStart);

        scheduler.pause();
        assert!(scheduler.flush().await.is_none());
        assert!(transport.sent_urls().is_empty());
        assert!(starts.lock().is_empty());
        assert_eq!(store.len(), 1);

        scheduler.resume();
        assert_eq!(scheduler.flush().await.unwrap().processed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_noop() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/a", 0, 5)).await.unwrap();
        store.add(&record("/b", 0, 5)).await.unwrap();
        let transport = Arc::new(GatedTransport {
            entered: Notify::new(),
            release: Notify::new(),
            sends: AtomicUsize::new(0),
        });
        let (scheduler, _bus) = scheduler(store.clone(), transport.clone(), Duration::ZERO);

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.flush().await }
        });
        transport.entered.notified().await;

        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(scheduler.flush().await.is_none());
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);

        transport.release.notify_one();
        transport.entered.notified().await;
        transport.release.notify_one();

        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_abort_flush() {
        let store = Arc::new(MemoryStore::new());
        store.add(&record("/a", 0, 5)).await.unwrap();
        store.add(&record("/b", 0, 5)).await.unwrap();
        let (scheduler, bus) = scheduler(store.clone(), Arc::new(MockTransport::default()), Duration::ZERO);
        bus.subscribe(EventKind::Success, |_| panic!("subscriber bug"));

        let summary = scheduler.flush().await.unwrap();

        assert_eq!(summary.processed, 2);
        assert!(store.is_empty());
        assert!(!scheduler.is_running());
    }
}
