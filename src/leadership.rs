// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local gate telling plugin subsystems they may perform leader-only work.
//!
//! The flag starts unset, is set exactly once by the bootstrap sequence after
//! the control loops are running, and is never cleared. It is not an election
//! protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct LeadershipFlag {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    leader: AtomicBool,
    notify: Notify,
}

impl LeadershipFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_leader(&self) -> bool {
        self.inner.leader.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns false if it was already set.
    pub(crate) fn set(&self) -> bool {
        let changed = self
            .inner
            .leader
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if changed {
            self.inner.notify.notify_waiters();
        }
        changed
    }

    /// Resolve once this instance holds leader authority.
    pub async fn wait_until_leader(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_leader() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for LeadershipFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeadershipFlag")
            .field("leader", &self.is_leader())
            .finish()
    }
}
