//! Task runtime: timer, attempts, cancellation and finalization.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Services;
use crate::domain::{
    Decision, EmulatorError, FinalizeReason, RetryConfig, TaskEvent, TaskName, TaskPhase,
    TaskRecord,
};

/// Shared by every task of one queue.
pub(crate) struct TaskContext {
    pub retry: RetryConfig,
    pub services: Services,
    /// Admission channel of the owning queue.
    pub ready: mpsc::UnboundedSender<Arc<Task>>,
    /// Completion events, consumed by the owning queue.
    pub events: mpsc::UnboundedSender<TaskEvent>,
}

struct Inner {
    record: TaskRecord,
    phase: TaskPhase,
    /// Bumped on every `schedule`; a timer from an older generation is stale.
    timer: u64,
}

/// One task and its lifecycle.
///
/// All mutable state sits behind one lock. Snapshots are clones taken under
/// that lock. Finalization happens exactly once and emits one
/// [`TaskEvent::Finalized`].
pub struct Task {
    name: TaskName,
    inner: Mutex<Inner>,
    cancel: CancellationToken,
    finished: watch::Sender<Option<FinalizeReason>>,
    ctx: Arc<TaskContext>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Task {
    pub(crate) fn new(record: TaskRecord, ctx: Arc<TaskContext>) -> Arc<Self> {
        let (finished, _) = watch::channel(None);
        Arc::new(Self {
            name: record.name.clone(),
            inner: Mutex::new(Inner {
                record,
                phase: TaskPhase::Scheduled,
                timer: 0,
            }),
            cancel: CancellationToken::new(),
            finished,
            ctx,
        })
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    pub fn snapshot(&self) -> TaskRecord {
        self.inner.lock().record.clone()
    }

    pub fn phase(&self) -> TaskPhase {
        self.inner.lock().phase
    }

    /// `None` until the task is finalized.
    pub fn finalize_reason(&self) -> Option<FinalizeReason> {
        *self.finished.borrow()
    }

    /// Resolves once the task is finalized.
    pub async fn wait_finalized(&self) -> FinalizeReason {
        let mut rx = self.finished.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives in `self`, so this only returns on a change.
            let _ = rx.changed().await;
        }
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Arm the timer for the current schedule time.
    ///
    /// The wait resolves exactly once: the delay elapses and the task goes to
    /// the admission channel, or the task is cancelled first and finalizes
    /// without dispatching. Past schedule times fire immediately.
    /// Arming again supersedes the previous timer.
    pub(crate) fn schedule(self: &Arc<Self>) {
        let (delay, generation) = {
            let mut inner = self.inner.lock();
            if inner.phase == TaskPhase::Finalized {
                return;
            }
            inner.phase = TaskPhase::Scheduled;
            inner.timer = inner.timer.wrapping_add(1);
            let delay = inner
                .record
                .schedule_time
                .duration_since(self.ctx.services.clock.now())
                .unwrap_or_default();
            (delay, inner.timer)
        };

        let task = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task.cancel.cancelled() => task.finalize(FinalizeReason::Cancelled),
                _ = tokio::time::sleep(delay) => task.mark_ready(generation),
            }
        });
    }

    fn mark_ready(self: &Arc<Self>, generation: u64) {
        let cancelled = {
            let mut inner = self.inner.lock();
            if inner.phase == TaskPhase::Finalized || inner.timer != generation {
                return;
            }
            if self.cancel.is_cancelled() {
                true
            } else if inner.phase == TaskPhase::Dispatching {
                // A run is in flight and re-arms the timer when it completes.
                return;
            } else {
                inner.phase = TaskPhase::Ready;
                false
            }
        };
        if cancelled {
            self.finalize(FinalizeReason::Cancelled);
            return;
        }

        debug!(task = %self.name, "task ready");
        if self.ctx.ready.send(Arc::clone(self)).is_err() {
            // Queue gone: nothing will ever admit this task.
            self.finalize(FinalizeReason::Cancelled);
        }
    }

    /// Claim a ready task for dispatch. `false` if it was cancelled,
    /// finalized or claimed by a run while waiting for admission.
    pub(crate) fn begin_dispatch(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.phase != TaskPhase::Ready || self.cancel.is_cancelled() {
            return false;
        }
        inner.phase = TaskPhase::Dispatching;
        true
    }

    /// One scheduled attempt, with retry enabled.
    pub(crate) async fn attempt(self: Arc<Self>) {
        let record = self.update_for_dispatch(&mut self.inner.lock());
        let status = self
            .ctx
            .services
            .dispatcher
            .dispatch(&record.outbound_target(), record.dispatch_deadline)
            .await;
        self.apply_result(status, true);
    }

    /// Out-of-band execution.
    ///
    /// Returns the state right after the attempt is recorded; the call and its
    /// result handling continue in the background with retry disabled. The
    /// task stays claimed until the call returns, so its timer cannot hand it
    /// to admission meanwhile. A failed run re-arms the timer for the
    /// unchanged schedule time.
    ///
    /// `FailedPrecondition` while another attempt is in flight or once the
    /// task is finalized.
    pub fn run(self: &Arc<Self>) -> Result<TaskRecord, EmulatorError> {
        let record = {
            let mut inner = self.inner.lock();
            match inner.phase {
                TaskPhase::Dispatching => {
                    return Err(EmulatorError::FailedPrecondition(
                        "The task is already being dispatched.".to_string(),
                    ));
                }
                TaskPhase::Finalized => {
                    return Err(EmulatorError::FailedPrecondition(
                        "The task no longer exists.".to_string(),
                    ));
                }
                TaskPhase::Scheduled | TaskPhase::Ready => {}
            }
            inner.phase = TaskPhase::Dispatching;
            self.update_for_dispatch(&mut inner)
        };
        let snapshot = record.clone();
        let task = Arc::clone(self);
        tokio::spawn(async move {
            let status = task
                .ctx
                .services
                .dispatcher
                .dispatch(&record.outbound_target(), record.dispatch_deadline)
                .await;
            task.apply_result(status, false);
        });
        Ok(snapshot)
    }

    /// Cancel the task. Idempotent; no effect once finalized.
    ///
    /// A pending wait finalizes the task; an attempt in flight runs to
    /// completion and the task finalizes instead of rescheduling.
    pub fn delete(&self) {
        let ready = {
            let inner = self.inner.lock();
            if inner.phase == TaskPhase::Finalized {
                return;
            }
            self.cancel.cancel();
            inner.phase == TaskPhase::Ready
        };
        // Ready tasks have no timer left to observe the token.
        if ready {
            self.finalize(FinalizeReason::Cancelled);
        }
    }

    fn update_for_dispatch(&self, inner: &mut Inner) -> TaskRecord {
        let now = self.ctx.services.clock.now();
        inner.record.start_attempt(now);
        inner.record.clone()
    }

    fn apply_result(self: &Arc<Self>, status: i32, retry_enabled: bool) {
        let now = self.ctx.services.clock.now();
        let (decision, dispatch_count) = {
            let mut inner = self.inner.lock();
            inner.record.finish_attempt(now, status);
            let count = inner.record.dispatch_count;
            let decision = Decision::decide(status, retry_enabled, count, &self.ctx.retry);
            if decision == Decision::Retry {
                let backoff = inner.record.schedule_retry(&self.ctx.retry);
                debug!(task = %self.name, ?backoff, schedule_time = %inner.record.schedule_time, "retry scheduled");
            }
            (decision, count)
        };
        info!(task = %self.name, status, dispatch_count, ?decision, "dispatch result");

        match decision {
            Decision::Complete => self.finalize(FinalizeReason::Succeeded),
            Decision::Stop => self.schedule(),
            Decision::Exhausted => {
                warn!(task = %self.name, dispatch_count, "attempts exhausted");
                self.finalize(FinalizeReason::Exhausted);
            }
            Decision::Retry => self.schedule(),
        }
    }

    fn finalize(&self, reason: FinalizeReason) {
        {
            let mut inner = self.inner.lock();
            if inner.phase == TaskPhase::Finalized {
                return;
            }
            inner.phase = TaskPhase::Finalized;
        }
        self.cancel.cancel();
        self.finished.send_replace(Some(reason));
        info!(task = %self.name, ?reason, "task done");
        let _ = self.ctx.events.send(TaskEvent::Finalized {
            name: self.name.clone(),
            reason,
        });
    }
}
