// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request data structures.
//!
//! [`RequestConfig`] is what callers hand to the executor. [`QueuedRequest`]
//! is the unit of persistence: created on the first transport failure,
//! mutated only by the scheduler, destroyed on success or exhaustion.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::OutboundRequest;

/// Header carrying the caller's idempotency token on every (re)send.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Opaque request payload.
///
/// Text is sent and hashed verbatim; JSON is rendered compactly with
/// sorted object keys, so structurally equal bodies hash the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    Text(String),
    Json(Value),
}

impl RequestBody {
    /// Wire form of the body.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A request as issued by the caller.
///
/// # Example
///
/// ```
/// use retry_queue::RequestConfig;
/// use serde_json::json;
///
/// let request = RequestConfig::post("https://api.example.com/items")
///     .header("Authorization", "Bearer abc")
///     .json(json!({"name": "widget"}))
///     .idempotency_key("create-widget-1");
///
/// assert_eq!(request.method, "POST");
/// assert!(request.retry);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub url: String,
    /// HTTP method (default `GET`); normalized to upper case on enqueue
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    /// Queue on transport failure (default `true`)
    pub retry: bool,
    /// Forwarded as `Idempotency-Key` on every attempt
    pub idempotency_key: Option<String>,
}

impl RequestConfig {
    /// A `GET` request to `url` with retry enabled.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            retry: true,
            idempotency_key: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).method("POST")
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(url).method("PUT")
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(url).method("PATCH")
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(url).method("DELETE")
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn json(self, value: Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(RequestBody::Text(text.into()))
    }

    /// Disable (or re-enable) queueing on transport failure.
    #[must_use]
    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Upper-cased method.
    #[must_use]
    pub fn normalized_method(&self) -> String {
        self.method.to_ascii_uppercase()
    }

    /// The first attempt, as handed to the transport.
    ///
    /// Carries the idempotency header when a key is set, so the server can
    /// recognise a later retry of the same call.
    #[must_use]
    pub fn to_outbound(&self) -> OutboundRequest {
        OutboundRequest::new(
            self.normalized_method(),
            self.url.clone(),
            with_idempotency_header(self.headers.clone(), self.idempotency_key.as_deref()),
            self.body.as_ref(),
        )
    }
}

/// A queued request awaiting retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// UUID, stable for the record's lifetime
    pub id: String,
    pub url: String,
    /// Upper-cased method
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,
    /// Enqueue time (epoch millis, strictly increasing within the process)
    pub created_at: i64,
    /// Failed retry attempts so far
    pub retries: u32,
    /// Retry limit snapshot taken at enqueue time
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Hash of (method, url, body), computed once at enqueue
    pub fingerprint: String,
}

impl QueuedRequest {
    /// Build a fresh record from a failed request.
    pub fn new(config: &RequestConfig, fingerprint: String, max_retries: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: config.url.clone(),
            method: config.normalized_method(),
            headers: config.headers.clone(),
            body: config.body.clone(),
            created_at: next_created_at(),
            retries: 0,
            max_retries,
            idempotency_key: config.idempotency_key.clone(),
            fingerprint,
        }
    }

    /// Attempt number of the next retry (1-based).
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.retries + 1
    }

    /// Whether the retry budget is spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    /// Copy of this record with one more failed attempt recorded.
    #[must_use]
    pub fn with_failed_attempt(&self) -> Self {
        Self {
            retries: self.retries.saturating_add(1),
            ..self.clone()
        }
    }

    /// The retry attempt, carrying the idempotency header if present.
    #[must_use]
    pub fn to_outbound(&self) -> OutboundRequest {
        let headers = with_idempotency_header(self.headers.clone(), self.idempotency_key.as_deref());
        OutboundRequest::new(self.method.clone(), self.url.clone(), headers, self.body.as_ref())
    }
}

/// Sets the idempotency header, replacing any caller-supplied spelling of it.
fn with_idempotency_header(mut headers: BTreeMap<String, String>, key: Option<&str>) -> BTreeMap<String, String> {
    if let Some(key) = key {
        headers.retain(|name, _| !name.eq_ignore_ascii_case(IDEMPOTENCY_HEADER));
        headers.insert(IDEMPOTENCY_HEADER.to_string(), key.to_string());
    }
    headers
}

static LAST_CREATED_AT: AtomicI64 = AtomicI64::new(0);

/// Epoch milliseconds, bumped past the previous value when the wall clock
/// has not advanced (or went backwards), so enqueue order is total.
pub fn next_created_at() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    match LAST_CREATED_AT.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(previous) | Err(previous) => now.max(previous + 1),
    }
}
