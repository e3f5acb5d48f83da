// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use crate::request::QueuedRequest;
use super::traits::{sort_fifo, QueueStore, StorageError};

/// Volatile queue store. Never fails; contents are lost with the process.
pub struct MemoryStore {
    data: DashMap<String, QueuedRequest>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn add(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        self.data.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedRequest>, StorageError> {
        let mut records: Vec<QueuedRequest> =
            self.data.iter().map(|r| r.value().clone()).collect();
        sort_fifo(&mut records);
        Ok(records)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<QueuedRequest>, StorageError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<QueuedRequest>, StorageError> {
        Ok(self
            .data
            .iter()
            .find(|r| r.value().fingerprint == fingerprint)
            .map(|r| r.value().clone()))
    }

    async fn update(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        // A record cleared mid-flush must not be resurrected
        if let Some(mut existing) = self.data.get_mut(&record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.data.len() as u64)
    }
}
