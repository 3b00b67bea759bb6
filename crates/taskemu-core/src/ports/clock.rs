//! Clock port.
//!
//! Task timers sleep on tokio time but compare against wall-clock timestamps,
//! so tests swap the clock for one that follows tokio's (pausable) clock.

use chrono::Utc;
use tokio::time::Instant;

use crate::domain::Timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from(Utc::now())
    }
}

/// `origin` plus the tokio time elapsed since construction.
///
/// Under a paused runtime this advances exactly as far as the timers do.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Timestamp,
    start: Instant,
}

impl TokioClock {
    pub fn new(origin: Timestamp) -> Self {
        Self {
            origin,
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.origin.saturating_add(self.start.elapsed())
    }
}
