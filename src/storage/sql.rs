// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable SQLite queue store.
//!
//! One row per queued request, keyed by id, with secondary indexes for the
//! two lookup paths the queue needs:
//!
//! ```sql
//! CREATE TABLE queued_requests (
//!   id TEXT PRIMARY KEY,
//!   url TEXT NOT NULL,
//!   method TEXT NOT NULL,
//!   headers TEXT,            -- JSON object, NULL when empty
//!   body TEXT,               -- JSON-encoded RequestBody, NULL when absent
//!   created_at INTEGER NOT NULL,
//!   retries INTEGER NOT NULL,
//!   max_retries INTEGER NOT NULL,
//!   idempotency_key TEXT,
//!   fingerprint TEXT NOT NULL
//! );
//! CREATE INDEX idx_queued_requests_created_at ON queued_requests (created_at);
//! CREATE INDEX idx_queued_requests_fingerprint ON queued_requests (fingerprint);
//! ```
//!
//! Individual operations are not retried here: the first failure is the
//! signal [`super::resilient::ResilientStore`] uses to fail over.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, info};

use crate::request::{QueuedRequest, RequestBody};
use crate::resilience::retry::{retry, RetryConfig};
use super::traits::{QueueStore, StorageError};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SELECT_COLUMNS: &str = "SELECT id, url, method, headers, body, created_at, retries, max_retries, idempotency_key, fingerprint FROM queued_requests";

pub struct SqlStore {
    pool: AnyPool,
    url: String,
}

impl SqlStore {
    /// Open (or create) the queue database at a file path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::new(&format!("sqlite://{}?mode=rwc", path_str)).await
    }

    /// Connect with startup-mode retry, then make sure the schema exists.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        // Each connection to an in-memory database is a separate database
        let max_connections = if connection_string.contains(":memory:") { 1 } else { 4 };

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self {
            pool,
            url: connection_string.to_string(),
        };
        store.enable_wal_mode().await?;
        store.init_schema().await?;

        info!(url = %store.url, "Queue database opened");
        Ok(store)
    }

    /// Close the pool. Every later operation fails with a backend error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        if self.url.contains(":memory:") {
            return Ok(());
        }
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS queued_requests (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                headers TEXT,
                body TEXT,
                created_at INTEGER NOT NULL,
                retries INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL,
                idempotency_key TEXT,
                fingerprint TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_queued_requests_created_at ON queued_requests (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_queued_requests_fingerprint ON queued_requests (fingerprint)",
        ];

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    fn encode_headers(headers: &BTreeMap<String, String>) -> Result<Option<String>, StorageError> {
        if headers.is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::to_string(headers)?))
        }
    }

    fn encode_body(body: Option<&RequestBody>) -> Result<Option<String>, StorageError> {
        body.map(serde_json::to_string).transpose().map_err(StorageError::from)
    }

    fn decode_row(row: &AnyRow) -> Result<QueuedRequest, StorageError> {
        let backend = |e: sqlx::Error| StorageError::Backend(e.to_string());

        let headers: Option<String> = row.try_get("headers").map_err(backend)?;
        let body: Option<String> = row.try_get("body").map_err(backend)?;
        let created_at: i64 = row.try_get("created_at").map_err(backend)?;
        let retries: i64 = row.try_get("retries").map_err(backend)?;
        let max_retries: i64 = row.try_get("max_retries").map_err(backend)?;

        Ok(QueuedRequest {
            id: row.try_get("id").map_err(backend)?,
            url: row.try_get("url").map_err(backend)?,
            method: row.try_get("method").map_err(backend)?,
            headers: match headers {
                Some(json) => serde_json::from_str(&json)?,
                None => BTreeMap::new(),
            },
            body: body.map(|json| serde_json::from_str(&json)).transpose()?,
            created_at,
            retries: u32::try_from(retries).unwrap_or(u32::MAX),
            max_retries: u32::try_from(max_retries).unwrap_or(u32::MAX),
            idempotency_key: row.try_get("idempotency_key").map_err(backend)?,
            fingerprint: row.try_get("fingerprint").map_err(backend)?,
        })
    }
}

#[async_trait]
impl QueueStore for SqlStore {
    async fn add(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        let headers = Self::encode_headers(&record.headers)?;
        let body = Self::encode_body(record.body.as_ref())?;

        sqlx::query(
            "INSERT INTO queued_requests (id, url, method, headers, body, created_at, retries, max_retries, idempotency_key, fingerprint)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                method = excluded.method,
                headers = excluded.headers,
                body = excluded.body,
                created_at = excluded.created_at,
                retries = excluded.retries,
                max_retries = excluded.max_retries,
                idempotency_key = excluded.idempotency_key,
                fingerprint = excluded.fingerprint",
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.method)
        .bind(headers)
        .bind(body)
        .bind(record.created_at)
        .bind(i64::from(record.retries))
        .bind(i64::from(record.max_retries))
        .bind(record.idempotency_key.clone())
        .bind(&record.fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(id = %record.id, "Record written to queue database");
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedRequest>, StorageError> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(Self::decode_row).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<QueuedRequest>, StorageError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<QueuedRequest>, StorageError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE fingerprint = ? LIMIT 1"))
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn update(&self, record: &QueuedRequest) -> Result<(), StorageError> {
        let headers = Self::encode_headers(&record.headers)?;
        let body = Self::encode_body(record.body.as_ref())?;

        // Plain UPDATE: a record cleared mid-flush stays gone
        sqlx::query(
            "UPDATE queued_requests SET
                url = ?, method = ?, headers = ?, body = ?, created_at = ?,
                retries = ?, max_retries = ?, idempotency_key = ?, fingerprint = ?
             WHERE id = ?",
        )
        .bind(&record.url)
        .bind(&record.method)
        .bind(headers)
        .bind(body)
        .bind(record.created_at)
        .bind(i64::from(record.retries))
        .bind(i64::from(record.max_retries))
        .bind(record.idempotency_key.clone())
        .bind(&record.fingerprint)
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM queued_requests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM queued_requests")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM queued_requests")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(count as u64)
    }
}
