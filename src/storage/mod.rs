// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue storage backends.
//!
//! - [`sql::SqlStore`]: durable SQLite store (the primary)
//! - [`memory::MemoryStore`]: volatile DashMap store (the fallback)
//! - [`resilient::ResilientStore`]: primary + fallback with sticky fail-over

pub mod traits;
pub mod memory;
pub mod sql;
pub mod resilient;
