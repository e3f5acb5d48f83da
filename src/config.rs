// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the offline client.
//!
//! # Example
//!
//! ```
//! use retry_queue::{ClientConfig, StorageBackend};
//!
//! // Minimal config (uses defaults)
//! let config = ClientConfig::default();
//! assert_eq!(config.retry_limit, 5);
//! assert_eq!(config.base_delay_ms, 1000);
//! assert!(config.auto_sync);
//!
//! // Volatile queue with fast retries
//! let config = ClientConfig {
//!     storage: StorageBackend::Memory,
//!     retry_limit: 3,
//!     base_delay_ms: 50,
//!     ..Default::default()
//! };
//! assert_eq!(config.base_delay().as_millis(), 50);
//! ```

use std::time::Duration;
use serde::Deserialize;

/// Which backend holds the queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Durable SQLite file, wrapped with an in-memory fallback.
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: String,
    },
    /// Volatile in-memory queue only (lost on restart).
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Sqlite { path: default_sqlite_path() }
    }
}

/// Configuration for the offline client.
///
/// All fields have defaults; the durable SQLite backend is used unless
/// `storage` says otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Storage backend selector (default: SQLite at `./retry_queue.db`)
    #[serde(default)]
    pub storage: StorageBackend,

    /// Attempts allowed per queued request before it is dropped (default: 5)
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Base backoff delay in milliseconds (default: 1000)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Flush automatically when the network comes back (default: true)
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,

    /// Promote per-request lifecycle logs from `debug` to `info`
    #[serde(default)]
    pub debug: bool,
}

fn default_sqlite_path() -> String { "./retry_queue.db".to_string() }
fn default_retry_limit() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_auto_sync() -> bool { true }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            retry_limit: default_retry_limit(),
            base_delay_ms: default_base_delay_ms(),
            auto_sync: default_auto_sync(),
            debug: false,
        }
    }
}

impl ClientConfig {
    /// Base backoff delay as a [`Duration`].
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}
