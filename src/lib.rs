// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Retry Queue
//!
//! Reliable, eventual delivery of requests issued while a client is offline
//! or while a remote call fails at the transport level.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request Executor                        │
//! │  • One immediate attempt through the Transport             │
//! │  • Transport failure → fingerprint → dedup → enqueue       │
//! │  • The caller always sees the original failure             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Resilient Storage                        │
//! │  • Primary: SQLite (durable, indexed by created_at / fp)   │
//! │  • Fallback: in-memory DashMap                             │
//! │  • Sticky, one-way fail-over on the first primary error    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!             (online edge from NetworkMonitor, or manual flush)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Retry Scheduler                         │
//! │  • FIFO snapshot, strictly sequential attempts             │
//! │  • At most one flush at a time, cooperative pause          │
//! │  • Exponential backoff per failing record                  │
//! │  • Lifecycle events on the EventBus                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use retry_queue::{ClientConfig, EventKind, HttpTransport, OfflineClient, RequestConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = OfflineClient::new(ClientConfig::default(), Arc::new(HttpTransport::new())).await;
//!
//!     let _sub = client.subscribe(EventKind::Queued, |event| {
//!         println!("queued: {:?}", event);
//!     });
//!
//!     let request = RequestConfig::post("https://api.example.com/orders")
//!         .json(serde_json::json!({"sku": "A-1", "qty": 2}))
//!         .idempotency_key("order-42");
//!
//!     if let Err(e) = client.execute(request).await {
//!         // Queued in the background; the caller still sees the failure.
//!         eprintln!("request failed: {e}");
//!     }
//!
//!     client.flush().await;
//!     client.destroy();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the assembled [`OfflineClient`]
//! - [`executor`]: immediate attempt + enqueue on transport failure
//! - [`scheduler`]: the [`RetryScheduler`] that drains the queue
//! - [`storage`]: storage backends (SQLite, memory) and the resilient composite
//! - [`dedup`]: duplicate suppression by fingerprint
//! - [`events`]: in-process publish/subscribe for lifecycle notifications
//! - [`transport`]: the send seam and the reqwest-backed implementation
//! - [`network`]: edge-triggered online/offline signal

/// Lifecycle log line that is promoted to `info` when the client runs with
/// `debug: true`, and stays at `debug` otherwise.
macro_rules! lifecycle {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod request;
pub mod fingerprint;
pub mod storage;
pub mod resilience;
pub mod dedup;
pub mod events;
pub mod transport;
pub mod executor;
pub mod scheduler;
pub mod network;
pub mod client;
pub mod metrics;

pub use config::{ClientConfig, StorageBackend};
pub use request::{QueuedRequest, RequestBody, RequestConfig};
pub use fingerprint::{fingerprint, FingerprintAlgorithm};
pub use storage::traits::{QueueStore, StorageError};
pub use storage::memory::MemoryStore;
pub use storage::sql::SqlStore;
pub use storage::resilient::{ResilientStore, StoreMode};
pub use dedup::DedupEngine;
pub use events::{Event, EventBus, EventKind, Subscription};
pub use transport::{OutboundRequest, Response, Transport, TransportError};
pub use transport::http::HttpTransport;
pub use executor::RequestExecutor;
pub use scheduler::{FlushSummary, RetryScheduler, SchedulerState};
pub use network::NetworkMonitor;
pub use client::OfflineClient;
pub use resilience::retry::RetryConfig;
