// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The send seam.
//!
//! The queue never talks to the network directly. It hands an
//! [`OutboundRequest`] to a [`Transport`] and classifies the outcome:
//!
//! - `Ok(Response)`: a completed attempt, whatever the status code
//! - `Err(TransportError)`: the request never completed (refused, timed out,
//!   DNS, ...). Only these are queued for retry.
//!
//! [`http::HttpTransport`] is the reqwest-backed implementation. Tests use
//! scripted in-memory transports.

pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::request::RequestBody;

pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Transport-level failure: the request did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// A fully-rendered request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl OutboundRequest {
    /// Render `body` to its wire form. JSON bodies get
    /// `Content-Type: application/json` unless the caller set one.
    pub fn new(
        method: String,
        url: String,
        mut headers: BTreeMap<String, String>,
        body: Option<&RequestBody>,
    ) -> Self {
        if body.is_some_and(RequestBody::is_json) && header_value(&headers, CONTENT_TYPE_HEADER).is_none() {
            headers.insert(CONTENT_TYPE_HEADER.to_string(), "application/json".to_string());
        }
        Self {
            method,
            url,
            headers,
            body: body.map(RequestBody::render),
        }
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A completed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request, exactly once. Implementations must not retry
/// internally.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<Response, TransportError>;
}
