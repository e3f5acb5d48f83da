// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use crate::request::QueuedRequest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Record serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Durable CRUD over queued-request records.
///
/// Every operation may fail with a [`StorageError`]; none of them treat a
/// missing id as an error.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or overwrite by id (last write wins).
    async fn add(&self, record: &QueuedRequest) -> Result<(), StorageError>;

    /// All records, ascending by `created_at` (ties broken by id).
    async fn get_all(&self) -> Result<Vec<QueuedRequest>, StorageError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<QueuedRequest>, StorageError>;

    /// Any one record with this fingerprint.
    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<QueuedRequest>, StorageError>;

    /// Overwrite by id. Absent ids are not an error.
    async fn update(&self, record: &QueuedRequest) -> Result<(), StorageError>;

    /// Delete by id. Absent ids are not an error.
    async fn remove(&self, id: &str) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;
}

/// FIFO order used by every backend.
pub(crate) fn sort_fifo(records: &mut [QueuedRequest]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
