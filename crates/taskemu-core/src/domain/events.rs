//! Completion events.
//!
//! A task emits [`TaskEvent`] to its queue; the queue drops the task from its
//! set and forwards a [`QueueEvent`] to the emulator, which tombstones the name.

use super::ids::TaskName;
use super::state::FinalizeReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Finalized { name: TaskName, reason: FinalizeReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    TaskRemoved { name: TaskName, reason: FinalizeReason },
}
