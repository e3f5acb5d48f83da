// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exponential backoff.
//!
//! Two users:
//! - [`retry`] wraps opening the durable store, so a briefly locked SQLite
//!   file does not immediately push the client onto the volatile fallback.
//! - [`backoff_delay`] is the per-record delay the scheduler waits after a
//!   failed retry attempt.
//!
//! # Example
//!
//! ```
//! use retry_queue::RetryConfig;
//! use retry_queue::resilience::retry::backoff_delay;
//! use std::time::Duration;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(3));
//!
//! // base * 2^retries
//! assert_eq!(backoff_delay(Duration::from_millis(100), 1), Duration::from_millis(200));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Largest exponent applied by [`backoff_delay`].
const MAX_BACKOFF_EXPONENT: u32 = 31;

/// Delay after a failed attempt of a record that had `retries` failures
/// before it: `base * 2^retries`, saturating.
#[must_use]
pub fn backoff_delay(base: Duration, retries: u32) -> Duration {
    let factor = 1u32 << retries.min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(factor)
}

/// Configuration for operation retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts; `None` retries forever
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Opening the durable store: a few quick attempts, then give up so the
    /// client can fall back to memory.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if let Some(max) = config.max_retries {
                    if attempts >= max {
                        return Err(err);
                    }
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    error = %err,
                    next_in = ?delay,
                    "Operation failed, retrying"
                );

                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}
