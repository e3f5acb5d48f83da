// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the retry scheduler.

/// Scheduler lifecycle state.
///
/// `paused` is orthogonal to `running`: pausing an idle scheduler only
/// blocks future flushes, pausing a running one stops it at the next item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No flush in flight, new flushes allowed
    Idle,
    /// A flush is draining the queue
    Running,
    /// Not running, new flushes are no-ops until resumed
    Paused,
    /// A flush is in flight but will stop at the next item boundary
    Stopping,
}

impl SchedulerState {
    pub(crate) fn from_flags(running: bool, paused: bool) -> Self {
        match (running, paused) {
            (false, false) => Self::Idle,
            (true, false) => Self::Running,
            (false, true) => Self::Paused,
            (true, true) => Self::Stopping,
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Counters for one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Records in the snapshot taken at flush start
    pub queue_size: usize,
    /// Retries that got a response (records removed)
    pub processed: usize,
    /// Attempts that errored this pass, backed off or exhausted
    pub failed: usize,
    /// Of `failed`, records dropped because their retries ran out
    pub exhausted: usize,
    /// The pass stopped early because the scheduler was paused
    pub interrupted: bool,
}

impl FlushSummary {
    /// Records from the snapshot that were not attempted this pass.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.queue_size.saturating_sub(self.processed + self.failed)
    }
}

impl std::fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FlushSummary(queued={}, processed={}, failed={}, exhausted={}{})",
            self.queue_size,
            self.processed,
            self.failed,
            self.exhausted,
            if self.interrupted { ", interrupted" } else { "" }
        )
    }
}
