// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The assembled offline client.
//!
//! Owns one storage stack, one event bus, one executor and one scheduler.
//! There are no process-wide singletons: construct a client explicitly, hand
//! it the network signals it should follow, and call
//! [`destroy`](OfflineClient::destroy) when done.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use retry_queue::{ClientConfig, HttpTransport, NetworkMonitor, OfflineClient, StorageBackend};
//!
//! # async fn example() {
//! let config = ClientConfig {
//!     storage: StorageBackend::Sqlite { path: "/var/lib/app/outbox.db".into() },
//!     ..Default::default()
//! };
//! let client = OfflineClient::new(config, Arc::new(HttpTransport::new())).await;
//!
//! let network = NetworkMonitor::new(true);
//! client.watch_network(&network);
//!
//! // Later, from the platform's reachability callback:
//! network.set_online(false);
//! network.set_online(true); // spawns a flush (auto_sync)
//!
//! client.destroy();
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ClientConfig, StorageBackend};
use crate::events::{Event, EventBus, EventKind, Subscription};
use crate::executor::RequestExecutor;
use crate::network::NetworkMonitor;
use crate::request::RequestConfig;
use crate::scheduler::{FlushSummary, RetryScheduler, SchedulerState};
use crate::storage::memory::MemoryStore;
use crate::storage::resilient::ResilientStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::QueueStore;
use crate::transport::{Response, Transport, TransportError};

pub struct OfflineClient {
    config: ClientConfig,
    store: Arc<dyn QueueStore>,
    bus: Arc<EventBus>,
    executor: RequestExecutor,
    scheduler: Arc<RetryScheduler>,
    observers: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineClient {
    /// Build a client on the backend named by `config.storage`.
    ///
    /// Never fails: if the durable store cannot be opened the client runs on
    /// a volatile in-memory queue and says so at `warn`.
    pub async fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let store = open_store(&config.storage).await;
        Self::with_store(config, store, transport)
    }

    /// Build a client on a caller-supplied store. `config.storage` is ignored.
    pub fn with_store(
        config: ClientConfig,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let executor = RequestExecutor::new(
            transport.clone(),
            store.clone(),
            bus.clone(),
            config.retry_limit,
        )
        .with_verbose(config.debug);
        let scheduler = RetryScheduler::new(store.clone(), transport, bus.clone(), config.base_delay())
            .with_verbose(config.debug);

        info!(
            retry_limit = config.retry_limit,
            base_delay_ms = config.base_delay_ms,
            auto_sync = config.auto_sync,
            "Offline client ready"
        );

        Self {
            config,
            store,
            bus,
            executor,
            scheduler: Arc::new(scheduler),
            observers: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `request` once; on a transport failure it is queued for retry
    /// and the failure is still returned.
    pub async fn execute(&self, request: RequestConfig) -> Result<Response, TransportError> {
        self.executor.execute(request).await
    }

    /// Drain the queue once. `None` if a flush is running or paused.
    pub async fn flush(&self) -> Option<FlushSummary> {
        self.scheduler.flush().await
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    /// Number of queued requests. A storage failure reads as empty.
    pub async fn queue_size(&self) -> usize {
        match self.store.count().await {
            Ok(n) => usize::try_from(n).unwrap_or(usize::MAX),
            Err(e) => {
                warn!(error = %e, "Failed to count queued requests");
                crate::metrics::record_storage_error("count");
                0
            }
        }
    }

    /// Drop every queued request.
    pub async fn clear_queue(&self) {
        match self.store.clear().await {
            Ok(()) => info!("Retry queue cleared"),
            Err(e) => {
                warn!(error = %e, "Failed to clear retry queue");
                crate::metrics::record_storage_error("clear");
            }
        }
    }

    pub fn subscribe<H>(&self, kind: EventKind, handler: H) -> Subscription
    where
        H: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    /// Follow `monitor`: each online edge spawns a flush (when `auto_sync`
    /// is on), each offline edge is logged.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_network(&self, monitor: &NetworkMonitor) {
        let mut rx = monitor.subscribe();
        let scheduler = self.scheduler.clone();
        let auto_sync = self.config.auto_sync;

        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if !online {
                    info!("Network went offline, failed requests will be queued");
                    continue;
                }
                if auto_sync {
                    info!("Network back online, flushing retry queue");
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        scheduler.flush().await;
                    });
                } else {
                    info!("Network back online, auto sync disabled");
                }
            }
        });
        self.observers.lock().push(handle);
    }

    /// Stop following network signals and drop every subscriber.
    ///
    /// An in-flight flush runs to completion; its remaining events go
    /// nowhere.
    pub fn destroy(&self) {
        for handle in self.observers.lock().drain(..) {
            handle.abort();
        }
        self.bus.remove_all_listeners();
        info!("Offline client destroyed");
    }
}

impl Drop for OfflineClient {
    fn drop(&mut self) {
        for handle in self.observers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn open_store(backend: &StorageBackend) -> Arc<dyn QueueStore> {
    match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Sqlite { path } => match SqlStore::open(path).await {
            Ok(sql) => Arc::new(ResilientStore::new(sql)),
            Err(e) => {
                warn!(path = %path, error = %e, "Durable queue store unavailable at init, using in-memory fallback");
                crate::metrics::set_storage_fallback(true);
                Arc::new(MemoryStore::new())
            }
        },
    }
}
