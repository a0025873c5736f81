//! Engine counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Pull round trips started (timer, refresh, reveal, lag recovery)
    pub polls_started: u64,
    /// Pull round trips that failed
    pub polls_failed: u64,
    /// Timer ticks and lag resyncs skipped because the window was hidden
    pub polls_skipped_hidden: u64,
    /// Updates that replaced the snapshot
    pub updates_applied: u64,
    /// Updates equal to the held snapshot
    pub updates_suppressed: u64,
    /// Field groups dropped because a newer write already landed
    pub stale_groups_discarded: u64,
    /// Round trips that completed after the engine stopped
    pub late_completions_discarded: u64,
    /// Push events received
    pub events_received: u64,
    /// Push events dropped while hidden
    pub events_skipped_hidden: u64,
    /// Push topics that could not be subscribed
    pub subscriptions_failed: u64,
    /// Automated actions issued
    pub actions_issued: u64,
    /// Automated actions that failed
    pub actions_failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub polls_started: AtomicU64,
    pub polls_failed: AtomicU64,
    pub polls_skipped_hidden: AtomicU64,
    pub updates_applied: AtomicU64,
    pub updates_suppressed: AtomicU64,
    pub stale_groups_discarded: AtomicU64,
    pub late_completions_discarded: AtomicU64,
    pub events_received: AtomicU64,
    pub events_skipped_hidden: AtomicU64,
    pub subscriptions_failed: AtomicU64,
    pub actions_issued: AtomicU64,
    pub actions_failed: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> SyncStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncStats {
            polls_started: load(&self.polls_started),
            polls_failed: load(&self.polls_failed),
            polls_skipped_hidden: load(&self.polls_skipped_hidden),
            updates_applied: load(&self.updates_applied),
            updates_suppressed: load(&self.updates_suppressed),
            stale_groups_discarded: load(&self.stale_groups_discarded),
            late_completions_discarded: load(&self.late_completions_discarded),
            events_received: load(&self.events_received),
            events_skipped_hidden: load(&self.events_skipped_hidden),
            subscriptions_failed: load(&self.subscriptions_failed),
            actions_issued: load(&self.actions_issued),
            actions_failed: load(&self.actions_failed),
        }
    }
}
