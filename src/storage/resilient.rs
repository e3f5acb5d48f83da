// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary + fallback store with sticky, one-way fail-over.
//!
//! Every operation goes to the primary until the primary fails once. From
//! then on the composite is in [`StoreMode::Fallback`] for the rest of its
//! lifetime: the failed operation is replayed against the fallback and every
//! later operation goes straight there without probing the primary.
//!
//! Records that only ever reached the primary are not visible after the
//! switch.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::request::QueuedRequest;
use super::memory::MemoryStore;
use super::traits::{QueueStore, StorageError};

/// Which adapter is serving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Primary,
    Fallback,
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

pub struct ResilientStore<P, F = MemoryStore> {
    primary: P,
    fallback: F,
    failed_over: AtomicBool,
}

impl<P: QueueStore> ResilientStore<P, MemoryStore> {
    /// Wrap `primary` with a fresh in-memory fallback.
    pub fn new(primary: P) -> Self {
        Self::with_fallback(primary, MemoryStore::new())
    }
}

impl<P: QueueStore, F: QueueStore> ResilientStore<P, F> {
    pub fn with_fallback(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            failed_over: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn mode(&self) -> StoreMode {
        if self.failed_over.load(Ordering::Acquire) {
            StoreMode::Fallback
        } else {
            StoreMode::Primary
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Flip to fallback mode. Only the first caller logs.
    fn fail_over(&self, operation: &str, error: &StorageError) {
        if self
            .failed_over
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!(
                operation,
                error = %error,
                "Primary queue store failed, switched to in-memory fallback for the rest of the process"
            );
            crate::metrics::set_storage_fallback(true);
        }
        crate::metrics::record_storage_error(operation);
    }
}

/// Run `$call` against the primary unless failed over; on its first error,
/// fail over and run it against the fallback.
macro_rules! route {
    ($self:ident, $op:literal, |$store:ident| $call:expr) => {{
        if !$self.failed_over.load(Ordering::Acquire) {
            let $store = &$self.primary;
            match $call.await {
                Ok(value) => return Ok(value),
                Err(e) => $self.fail_over($op, &e),
            }
        }
        let $store = &$self.fallback;
        $call.await
    }};
}

#[async_trait]
impl<P: QueueStore, F: QueueStore> QueueStore for ResilientStore<P, F> {
    async fn add(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        route!(self, "add", |store| store.add(record))
    }

    async fn get_all(&self) -> Result<Vec<QueuedRequest>, StorageError> {
        route!(self, "get_all", |store| store.get_all())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<QueuedRequest>, StorageError> {
        route!(self, "get_by_id", |store| store.get_by_id(id))
    }

    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<QueuedRequest>, StorageError> {
        route!(self, "get_by_fingerprint", |store| store.get_by_fingerprint(fingerprint))
    }

    async fn update(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        route!(self, "update", |store| store.update(record))
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        route!(self, "remove", |store| store.remove(id))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        route!(self, "clear", |store| store.clear())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        route!(self, "count", |store| store.count())
    }
}
