// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Duplicate suppression for the enqueue path.
//!
//! Answers one question: is a request with this fingerprint already queued?
//! It only prevents re-queueing; it does not deduplicate network delivery.
//! The check is read-only and races with concurrent enqueues, so two
//! byte-identical failures at the same instant can both be queued.

use std::sync::Arc;

use crate::storage::traits::{QueueStore, StorageError};

pub struct DedupEngine {
    store: Arc<dyn QueueStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// True iff a record with `fingerprint` exists.
    pub async fn is_duplicate(&self, fingerprint: &str) -> Result<bool, StorageError> {
        Ok(self.store.get_by_fingerprint(fingerprint).await?.is_some())
    }
}
