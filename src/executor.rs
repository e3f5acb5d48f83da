// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Immediate attempt, and enqueue on transport failure.
//!
//! ```text
//! execute(config)
//!     │
//!     ├─ transport.send ── Ok(response) ──────────────► Ok(response)   (any status)
//!     │
//!     └─ Err(transport error)
//!           ├─ retry disabled ────────────────────────► Err(error)
//!           ├─ fingerprint already queued ────────────► Err(error)
//!           └─ add record, publish `queued` ──────────► Err(error)
//! ```
//!
//! The caller always sees the original failure. Queueing is a background
//! concern, not an alternate success path. Storage errors on the enqueue
//! path are logged and counted, never surfaced.

use std::sync::Arc;

use tracing::warn;

use crate::dedup::DedupEngine;
use crate::events::{Event, EventBus};
use crate::fingerprint::fingerprint;
use crate::request::{QueuedRequest, RequestConfig};
use crate::storage::traits::QueueStore;
use crate::transport::{Response, Transport, TransportError};

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    store: Arc<dyn QueueStore>,
    dedup: DedupEngine,
    bus: Arc<EventBus>,
    retry_limit: u32,
    verbose: bool,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn QueueStore>,
        bus: Arc<EventBus>,
        retry_limit: u32,
    ) -> Self {
        Self {
            transport,
            dedup: DedupEngine::new(store.clone()),
            store,
            bus,
            retry_limit,
            verbose: false,
        }
    }

    /// Promote per-request lifecycle logs to `info`.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Send `config` once. On a transport failure, queue it for retry
    /// (unless disabled or already queued) and return the failure.
    pub async fn execute(&self, config: RequestConfig) -> Result<Response, TransportError> {
        let error = match self.transport.send(&config.to_outbound()).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        crate::metrics::record_transport_failure(error_kind(&error));

        if !config.retry {
            lifecycle!(self.verbose, url = %config.url, error = %error, "Request failed, retry disabled");
            return Err(error);
        }

        self.enqueue(&config).await;
        Err(error)
    }

    /// Best effort: storage failures here are logged and swallowed.
    async fn enqueue(&self, config: &RequestConfig) {
        let method = config.normalized_method();
        let fp = fingerprint(&method, &config.url, config.body.as_ref());

        match self.dedup.is_duplicate(&fp).await {
            Ok(true) => {
                crate::metrics::record_duplicate_suppressed();
                lifecycle!(self.verbose, method = %method, url = %config.url, fingerprint = %fp, "Request already queued, not enqueueing again");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Unknown: queue it anyway
                warn!(error = %e, "Duplicate check failed");
                crate::metrics::record_storage_error("get_by_fingerprint");
            }
        }

        let record = QueuedRequest::new(config, fp, self.retry_limit);
        if let Err(e) = self.store.add(&record).await {
            warn!(id = %record.id, url = %record.url, error = %e, "Failed to queue request for retry");
            crate::metrics::record_storage_error("add");
            return;
        }

        crate::metrics::record_queued();
        lifecycle!(self.verbose, id = %record.id, method = %record.method, url = %record.url, "Request queued for retry");
        self.bus.publish(&Event::Queued { record });
    }
}

fn error_kind(error: &TransportError) -> &'static str {
    match error {
        TransportError::Connect(_) => "connect",
        TransportError::Timeout(_) => "timeout",
        TransportError::Other(_) => "other",
    }
}
