//! Queue engine: owned tasks, admission loop and queue lifecycle.
//!
//! Ready tasks arrive on an unbounded channel fed by their timers. The
//! admission loop takes them one at a time, holds them while the queue is
//! paused, then waits for a rate token and a concurrency permit before
//! spawning the attempt.

mod admission;
mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use task::Task;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use self::admission::{Admission, dispatch_permits, rate_limiter};
use self::task::TaskContext;
use crate::domain::{
    EmulatorError, QueueEvent, QueueName, QueueRecord, QueueState, RateLimits, RetryConfig,
    TaskEvent, TaskName, TaskRecord, TaskSpec,
};
use crate::observability::DispatchCounters;
use crate::ports::{Clock, Dispatcher, TaskIdGenerator};

/// Collaborators shared by every queue of an emulator.
#[derive(Clone)]
pub struct Services {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn TaskIdGenerator>,
    /// Replaces `<project>.appspot.com` in routed targets.
    pub host_override: Option<String>,
}

pub struct Queue {
    name: QueueName,
    retry: RetryConfig,
    rate: RateLimits,
    state: watch::Sender<QueueState>,
    tasks: RwLock<HashMap<TaskName, Arc<Task>>>,
    ctx: Arc<TaskContext>,
    /// Taken by the first `run`.
    ready: Mutex<Option<mpsc::UnboundedReceiver<Arc<Task>>>>,
    shutdown: CancellationToken,
    counters: Arc<DispatchCounters>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Queue {
    /// Create a running queue. Its admission loop starts with [`Queue::run`].
    ///
    /// Every finalized task is dropped from the queue and reported on
    /// `events`. Must be called inside a tokio runtime.
    pub fn new(
        name: QueueName,
        retry: RetryConfig,
        rate: RateLimits,
        services: Services,
        events: mpsc::UnboundedSender<QueueEvent>,
    ) -> Arc<Self> {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (task_events_tx, task_events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(QueueState::Running);

        let queue = Arc::new(Self {
            name,
            retry,
            rate,
            state,
            tasks: RwLock::new(HashMap::new()),
            ctx: Arc::new(TaskContext {
                retry,
                services,
                ready: ready_tx,
                events: task_events_tx,
            }),
            ready: Mutex::new(Some(ready_rx)),
            shutdown: CancellationToken::new(),
            counters: Arc::new(DispatchCounters::default()),
        });

        tokio::spawn(forward_task_events(
            Arc::downgrade(&queue),
            task_events_rx,
            events,
        ));
        queue
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    pub fn snapshot(&self) -> QueueRecord {
        QueueRecord {
            name: self.name.clone(),
            retry_config: self.retry,
            rate_limits: self.rate,
            state: self.state(),
            stats: self.counters.stats(self.tasks.read().len()),
        }
    }

    /// Create a task, arm its timer and return it with its initial snapshot.
    pub fn new_task(&self, spec: TaskSpec) -> Result<(Arc<Task>, TaskRecord), EmulatorError> {
        if self.state().is_terminal() {
            return Err(EmulatorError::FailedPrecondition(
                "The queue no longer exists, though a queue with this name existed recently."
                    .to_string(),
            ));
        }

        let services = &self.ctx.services;
        let record = TaskRecord::create(
            spec,
            &self.name,
            services.clock.now(),
            services.host_override.as_deref(),
            || services.ids.generate_task_id(),
        )?;

        let task = {
            let mut tasks = self.tasks.write();
            if tasks.contains_key(&record.name) {
                return Err(EmulatorError::AlreadyExists(
                    "Requested entity already exists".to_string(),
                ));
            }
            let task = Task::new(record.clone(), Arc::clone(&self.ctx));
            tasks.insert(record.name.clone(), Arc::clone(&task));
            task
        };
        task.schedule();

        info!(queue = %self.name, task = %record.name, schedule_time = %record.schedule_time, "task created");
        Ok((task, record))
    }

    pub fn get_task(&self, name: &TaskName) -> Option<Arc<Task>> {
        self.tasks.read().get(name).cloned()
    }

    /// Snapshots of the live tasks, ordered by name.
    pub fn list_tasks(&self) -> Vec<TaskRecord> {
        let tasks: Vec<Arc<Task>> = self.tasks.read().values().cloned().collect();
        let mut records: Vec<TaskRecord> = tasks.iter().map(|t| t.snapshot()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Start the admission loop. Later calls are no-ops.
    pub fn run(&self) {
        let Some(ready) = self.ready.lock().take() else {
            return;
        };
        let admission = Admission {
            queue: self.name.clone(),
            limiter: rate_limiter(&self.rate),
            permits: dispatch_permits(&self.rate),
            state: self.state.subscribe(),
            shutdown: self.shutdown.clone(),
            counters: Arc::clone(&self.counters),
        };
        tokio::spawn(admission.run(ready));
    }

    pub fn pause(&self) -> Result<QueueRecord, EmulatorError> {
        self.transition(QueueState::Paused)?;
        info!(queue = %self.name, "queue paused");
        Ok(self.snapshot())
    }

    pub fn resume(&self) -> Result<QueueRecord, EmulatorError> {
        self.transition(QueueState::Running)?;
        info!(queue = %self.name, "queue resumed");
        Ok(self.snapshot())
    }

    fn transition(&self, to: QueueState) -> Result<(), EmulatorError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                result = Err(EmulatorError::FailedPrecondition(
                    "The queue no longer exists, though a queue with this name existed recently."
                        .to_string(),
                ));
                return false;
            }
            let changed = *state != to;
            *state = to;
            changed
        });
        result
    }

    /// Cancel every owned task. Attempts in flight run to completion.
    pub fn purge(&self) -> QueueRecord {
        let tasks: Vec<Arc<Task>> = self.tasks.read().values().cloned().collect();
        for task in &tasks {
            task.delete();
        }
        info!(queue = %self.name, purged = tasks.len(), "queue purged");
        self.snapshot()
    }

    /// Stop admission, purge every task and mark the queue terminal.
    /// Idempotent.
    pub fn delete(&self) {
        let first = self.state.send_if_modified(|state| {
            let changed = !state.is_terminal();
            *state = QueueState::Deleted;
            changed
        });
        self.shutdown.cancel();
        self.purge();
        if first {
            info!(queue = %self.name, "queue deleted");
        }
    }
}

/// Drop finalized tasks from the queue and pass the news on.
async fn forward_task_events(
    queue: Weak<Queue>,
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
    forward: mpsc::UnboundedSender<QueueEvent>,
) {
    while let Some(TaskEvent::Finalized { name, reason }) = events.recv().await {
        if let Some(queue) = queue.upgrade() {
            queue.tasks.write().remove(&name);
        }
        let _ = forward.send(QueueEvent::TaskRemoved { name, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::{FinalizeReason, RateSpec, Timestamp};
    use crate::queue::testing::{EPOCH, ScriptedDispatcher, assert_close, http_spec, services};

    fn queue_with(
        dispatcher: Arc<ScriptedDispatcher>,
        retry: RetryConfig,
        rate: RateLimits,
    ) -> (Arc<Queue>, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Queue::new(
            "projects/p/locations/l/queues/q".parse().unwrap(),
            retry,
            rate,
            services(dispatcher),
            tx,
        );
        queue.run();
        (queue, rx)
    }

    fn queue(dispatcher: Arc<ScriptedDispatcher>) -> (Arc<Queue>, mpsc::UnboundedReceiver<QueueEvent>) {
        queue_with(dispatcher, RetryConfig::default(), RateLimits::default())
    }

    fn at(secs: u64) -> Timestamp {
        EPOCH.saturating_add(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn new_task_returns_normalized_snapshot_and_owns_the_task() {
        let (queue, _events) = queue(ScriptedDispatcher::new([200]));
        let (task, record) = queue.new_task(http_spec().with_schedule_time(at(60))).unwrap();

        assert_eq!(record.name.to_string(), "projects/p/locations/l/queues/q/tasks/1");
        assert_eq!(record.create_time, EPOCH);
        assert_eq!(record.dispatch_count, 0);
        assert_eq!(task.snapshot(), record);
        assert_eq!(queue.list_tasks(), vec![record.clone()]);
        assert!(queue.get_task(&record.name).is_some());
        assert_eq!(queue.snapshot().stats.tasks_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_live_name_is_already_exists() {
        let (queue, _events) = queue(ScriptedDispatcher::new([200]));
        let spec = http_spec()
            .with_name("projects/p/locations/l/queues/q/tasks/same")
            .with_schedule_time(at(60));
        queue.new_task(spec.clone()).unwrap();
        let err = queue.new_task(spec).unwrap_err();
        assert!(matches!(err, EmulatorError::AlreadyExists(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn finalized_tasks_leave_the_queue_and_are_reported() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, mut events) = queue(dispatcher.clone());
        let (task, record) = queue.new_task(http_spec()).unwrap();

        assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        assert_eq!(
            events.recv().await,
            Some(QueueEvent::TaskRemoved {
                name: record.name.clone(),
                reason: FinalizeReason::Succeeded,
            })
        );
        assert!(queue.get_task(&record.name).is_none());
        assert!(queue.list_tasks().is_empty());

        let stats = queue.snapshot().stats;
        assert_eq!(stats.executed_count, 1);
        assert_eq!(stats.concurrent_dispatches_count, 0);
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_queue_holds_ready_tasks_until_resumed() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, _events) = queue(dispatcher.clone());
        let paused = queue.pause().unwrap();
        assert_eq!(paused.state, QueueState::Paused);

        let (task, _) = queue.new_task(http_spec()).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(dispatcher.call_count(), 0);
        assert!(task.finalize_reason().is_none());

        assert_eq!(queue.resume().unwrap().state, QueueState::Running);
        assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_does_not_affect_attempts_in_flight() {
        let dispatcher = ScriptedDispatcher::with_latency([200], Duration::from_secs(5));
        let (queue, _events) = queue(dispatcher.clone());
        let (task, _) = queue.new_task(http_spec()).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(queue.snapshot().stats.concurrent_dispatches_count, 1);
        queue.pause().unwrap();

        assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn task_deleted_while_held_by_pause_is_never_dispatched() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, _events) = queue(dispatcher.clone());
        queue.pause().unwrap();
        let (task, _) = queue.new_task(http_spec()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        task.delete();
        assert_eq!(task.wait_finalized().await, FinalizeReason::Cancelled);
        queue.resume().unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_permits() {
        let dispatcher = ScriptedDispatcher::with_latency([200], Duration::from_secs(10));
        let rate = RateLimits::from_spec(&RateSpec {
            max_concurrent_dispatches: Some(2),
            ..Default::default()
        })
        .unwrap();
        let (queue, _events) = queue_with(dispatcher.clone(), RetryConfig::default(), rate);

        let tasks: Vec<Arc<Task>> = (0..5)
            .map(|_| queue.new_task(http_spec()).unwrap().0)
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(dispatcher.call_count(), 2);
        assert_eq!(queue.snapshot().stats.concurrent_dispatches_count, 2);

        for task in &tasks {
            assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        }
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 5);
        assert_close(calls[4].at - calls[0].at, Duration::from_secs(20));
        assert_eq!(queue.snapshot().stats.executed_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_cancels_every_task_but_keeps_the_queue() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, mut events) = queue(dispatcher.clone());
        let tasks: Vec<Arc<Task>> = (0..3)
            .map(|_| queue.new_task(http_spec().with_schedule_time(at(600))).unwrap().0)
            .collect();

        let snapshot = queue.purge();
        assert_eq!(snapshot.state, QueueState::Running);
        for task in &tasks {
            assert_eq!(task.wait_finalized().await, FinalizeReason::Cancelled);
        }
        for _ in 0..3 {
            assert!(matches!(
                events.recv().await,
                Some(QueueEvent::TaskRemoved { reason: FinalizeReason::Cancelled, .. })
            ));
        }
        assert!(queue.list_tasks().is_empty());
        assert!(queue.new_task(http_spec()).is_ok());
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_queue_is_terminal() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, _events) = queue(dispatcher.clone());
        let (task, _) = queue.new_task(http_spec().with_schedule_time(at(5))).unwrap();

        queue.delete();
        queue.delete();

        assert_eq!(task.wait_finalized().await, FinalizeReason::Cancelled);
        assert_eq!(queue.state(), QueueState::Deleted);
        assert!(matches!(
            queue.new_task(http_spec()),
            Err(EmulatorError::FailedPrecondition(_))
        ));
        assert!(queue.pause().is_err());
        assert!(queue.resume().is_err());
        assert_eq!(queue.state(), QueueState::Deleted);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_fire_in_schedule_order() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let (queue, _events) = queue(dispatcher.clone());
        let (late, _) = queue.new_task(http_spec().with_schedule_time(at(20))).unwrap();
        let (early, _) = queue.new_task(http_spec().with_schedule_time(at(10))).unwrap();

        late.wait_finalized().await;
        early.wait_finalized().await;

        let calls = dispatcher.calls();
        assert_eq!(calls[0].target.headers()["X-CloudTasks-TaskName"], early.name().task_id());
        assert_eq!(calls[1].target.headers()["X-CloudTasks-TaskName"], late.name().task_id());
        assert_close(calls[1].at - calls[0].at, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_tasks_already_waiting_for_a_permit() {
        let dispatcher = ScriptedDispatcher::with_latency([200], Duration::from_secs(10));
        let rate = RateLimits::from_spec(&RateSpec {
            max_concurrent_dispatches: Some(1),
            ..Default::default()
        })
        .unwrap();
        let (queue, _events) = queue_with(dispatcher.clone(), RetryConfig::default(), rate);
        let tasks: Vec<Arc<Task>> = (0..2)
            .map(|_| queue.new_task(http_spec()).unwrap().0)
            .collect();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(dispatcher.call_count(), 1);
        queue.pause().unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(dispatcher.call_count(), 1);
        let done = tasks.iter().filter(|t| t.finalize_reason().is_some()).count();
        assert_eq!(done, 1);
        assert_eq!(queue.snapshot().stats.concurrent_dispatches_count, 0);

        queue.resume().unwrap();
        for task in &tasks {
            assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        }
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 2);
        assert_close(calls[1].at - calls[0].at, Duration::from_secs(21));
    }

    // Real time: the token bucket runs on the wall clock.
    #[tokio::test]
    async fn dispatch_rate_is_bounded_by_the_token_bucket() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let rate = RateLimits::from_spec(&RateSpec {
            max_dispatches_per_second: Some(4.0),
            max_burst_size: Some(1),
            ..Default::default()
        })
        .unwrap();
        let (queue, _events) = queue_with(dispatcher.clone(), RetryConfig::default(), rate);
        let tasks: Vec<Arc<Task>> = (0..3)
            .map(|_| queue.new_task(http_spec()).unwrap().0)
            .collect();

        for task in &tasks {
            assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        }
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].at - pair[0].at;
            assert!(gap >= Duration::from_millis(200), "dispatches {gap:?} apart");
        }
        assert!(calls[2].at - calls[0].at < Duration::from_secs(2));
    }
}
