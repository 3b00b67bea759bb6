//! Task lifecycle phases.

use serde::{Deserialize, Serialize};

/// Where a task is in its lifecycle.
///
/// ```text
/// Scheduled --elapse--> Ready --admit--> Dispatching --retry--> Scheduled
///     |                   |                   |
///     +------cancel-------+-------------------+--> Finalized
/// ```
///
/// A scheduled wait resolves exactly once, either by elapsing or by
/// cancellation. An attempt in flight is never aborted; cancellation only
/// keeps it from being rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    /// Timer armed, waiting for the schedule time.
    Scheduled,
    /// Handed to the queue's admission loop.
    Ready,
    /// An attempt is in flight.
    Dispatching,
    Finalized,
}

/// Why a task was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizeReason {
    Succeeded,
    Cancelled,
    Exhausted,
}
