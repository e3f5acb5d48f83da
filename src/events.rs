// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process publish/subscribe for queue lifecycle notifications.
//!
//! Handlers are synchronous and run on the publisher's task. Publishing
//! iterates a snapshot of the subscriber list, so a handler may subscribe or
//! unsubscribe during dispatch. A panicking handler is caught and logged; it
//! never reaches the publisher or starves the handlers after it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use retry_queue::{Event, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let seen_clone = seen.clone();
//!
//! let sub = bus.subscribe(EventKind::FlushStart, move |event| {
//!     if let Event::FlushStart { queue_size } = event {
//!         seen_clone.fetch_add(*queue_size, Ordering::SeqCst);
//!     }
//! });
//!
//! bus.publish(&Event::FlushStart { queue_size: 3 });
//! sub.unsubscribe();
//! bus.publish(&Event::FlushStart { queue_size: 3 });
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 3);
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use crate::request::QueuedRequest;
use crate::transport::{Response, TransportError};

/// Event name, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Queued,
    Retry,
    Success,
    Failure,
    FlushStart,
    FlushComplete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Retry => write!(f, "retry"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::FlushStart => write!(f, "flushStart"),
            Self::FlushComplete => write!(f, "flushComplete"),
        }
    }
}

/// Lifecycle event with its payload.
#[derive(Debug, Clone)]
pub enum Event {
    /// A failed request was persisted for retry
    Queued { record: QueuedRequest },
    /// A retry attempt is about to be sent (`attempt = retries + 1`)
    Retry { record: QueuedRequest, attempt: u32 },
    /// A retry was delivered; the record has been removed
    Success { record: QueuedRequest, response: Response },
    /// Retries exhausted; the record has been removed
    Failure { record: QueuedRequest, error: TransportError },
    /// A flush pass began over a snapshot of this size
    FlushStart { queue_size: usize },
    /// A flush pass ended (completed or stopped by pause)
    FlushComplete { processed: usize, failed: usize },
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Queued { .. } => EventKind::Queued,
            Self::Retry { .. } => EventKind::Retry,
            Self::Success { .. } => EventKind::Success,
            Self::Failure { .. } => EventKind::Failure,
            Self::FlushStart { .. } => EventKind::FlushStart,
            Self::FlushComplete { .. } => EventKind::FlushComplete,
        }
    }

    /// The record this event is about, if any.
    #[must_use]
    pub fn record(&self) -> Option<&QueuedRequest> {
        match self {
            Self::Queued { record }
            | Self::Retry { record, .. }
            | Self::Success { record, .. }
            | Self::Failure { record, .. } => Some(record),
            Self::FlushStart { .. } | Self::FlushComplete { .. } => None,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Event name → ordered subscriber list.
#[derive(Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Handlers run in subscription order.
    pub fn subscribe<H>(&self, kind: EventKind, handler: H) -> Subscription
    where
        H: Fn(&Event) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            kind,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every current subscriber of its kind.
    pub fn publish(&self, event: &Event) {
        let kind = event.kind();
        let snapshot: Vec<Handler> = {
            let registry = self.registry.read();
            match registry.handlers.get(&kind) {
                Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = %kind, "Event handler panicked, continuing with remaining handlers");
            }
        }
    }

    /// Drop every subscription.
    pub fn remove_all_listeners(&self) {
        self.registry.write().handlers.clear();
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.read().handlers.get(&kind).map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping it keeps the handler registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
    registry: Weak<RwLock<Registry>>,
}

impl Subscription {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. A no-op if the bus is gone or was cleared.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else { return };
        let mut registry = registry.write();
        if let Some(handlers) = registry.handlers.get_mut(&self.kind) {
            handlers.retain(|(id, _)| *id != self.id);
        }
    }
}
