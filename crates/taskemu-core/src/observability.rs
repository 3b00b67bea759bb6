//! Per-queue runtime statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Statistics carried on queue snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Live tasks owned by the queue.
    pub tasks_count: u64,
    /// Scheduled attempts in flight.
    pub concurrent_dispatches_count: u64,
    /// Scheduled attempts completed since the queue was created.
    pub executed_count: u64,
}

/// Counters updated by the admission loop.
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    in_flight: AtomicU64,
    executed: AtomicU64,
}

impl DispatchCounters {
    pub fn started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self, tasks_count: usize) -> QueueStats {
        QueueStats {
            tasks_count: tasks_count as u64,
            concurrent_dispatches_count: self.in_flight.load(Ordering::Relaxed),
            executed_count: self.executed.load(Ordering::Relaxed),
        }
    }
}
