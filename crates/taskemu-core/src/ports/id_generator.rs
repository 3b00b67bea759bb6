//! Task id generation.
//!
//! Generated task ids are decimal `u64`s, like the managed service's.

use std::sync::atomic::{AtomicU64, Ordering};

pub trait TaskIdGenerator: Send + Sync {
    fn generate_task_id(&self) -> String;
}

/// Uniformly random `u64` ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl TaskIdGenerator for RandomIdGenerator {
    fn generate_task_id(&self) -> String {
        rand::random::<u64>().to_string()
    }
}

/// `start`, `start + 1`, ... Deterministic ids for tests.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl TaskIdGenerator for SequentialIdGenerator {
    fn generate_task_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}
