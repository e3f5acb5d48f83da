// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Edge-triggered online/offline signal.
//!
//! The queue does not probe connectivity. The host feeds it through
//! [`NetworkMonitor::set_online`] (from an OS reachability callback, a
//! failed health check, a UI toggle, ...) and subscribers only see
//! transitions: setting the same state twice wakes nobody.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug)]
pub struct NetworkMonitor {
    tx: watch::Sender<bool>,
}

impl Default for NetworkMonitor {
    /// Starts online.
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current connectivity. Returns `true` if this was a
    /// transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Network status changed");
        }
        changed
    }

    /// Receiver that wakes on each transition. The current value is marked
    /// as seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
