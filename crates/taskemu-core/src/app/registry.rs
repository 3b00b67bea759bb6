//! Emulator: the administrative surface over queues and tasks.
//!
//! Names are parsed and validated here. Queues and tasks live in
//! tombstone-aware maps so that lookups of recently removed names fail
//! differently from lookups of names that never existed.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::builder::EmulatorBuilder;
use super::tombstone::{Lookup, TombstoneMap};
use crate::domain::{
    EmulatorError, LocationName, QueueEvent, QueueName, QueueRecord, QueueSpec, RateLimits,
    RetryConfig, TaskName, TaskRecord, TaskSpec,
};
use crate::queue::{Queue, Services, Task};

const INVALID_RESOURCE: &str = "Invalid resource field value in the request.";
const QUEUE_EXISTS: &str = "Queue already exists";
const QUEUE_TOO_RECENT: &str =
    "The queue cannot be created because a queue with this name existed too recently.";
const QUEUE_NOT_FOUND: &str = "Requested entity was not found.";
const PARENT_QUEUE_MISSING: &str = "Queue does not exist.";
const PARENT_QUEUE_GONE: &str =
    "The queue no longer exists, though a queue with this name existed recently.";
const TASK_EXISTS: &str = "Requested entity already exists";
const TASK_TOO_RECENT: &str =
    "The task cannot be created because a task with this name existed too recently.";
const TASK_MISSING: &str = "Task does not exist.";
const TASK_GONE: &str = "The task no longer exists, though a task with this name existed recently. The task either successfully completed or was deleted.";

type TaskMap = RwLock<TombstoneMap<TaskName, Arc<Task>>>;

enum TaskLookup {
    Live(Arc<Task>),
    Gone,
    Absent,
}

pub struct Emulator {
    queues: RwLock<TombstoneMap<QueueName, Arc<Queue>>>,
    tasks: Arc<TaskMap>,
    services: Services,
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("queues", &self.queues.read().live().count())
            .field("tasks", &self.tasks.read().live().count())
            .finish()
    }
}

impl Emulator {
    pub fn builder() -> EmulatorBuilder {
        EmulatorBuilder::new()
    }

    /// Must be called inside a tokio runtime.
    pub(crate) fn new(services: Services) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let tasks = Arc::new(TaskMap::default());
        tokio::spawn(tombstone_removed_tasks(Arc::downgrade(&tasks), events_rx));
        Self {
            queues: RwLock::new(TombstoneMap::default()),
            tasks,
            services,
            events,
        }
    }

    // ----- queues -----

    /// Create a running queue under `parent` (`projects/<p>/locations/<l>`).
    pub fn create_queue(&self, parent: &str, spec: QueueSpec) -> Result<QueueRecord, EmulatorError> {
        let parent: LocationName = parent.parse()?;
        let name: QueueName = spec.name.parse()?;
        if name.location() != parent {
            return Err(EmulatorError::InvalidArgument(INVALID_RESOURCE.to_string()));
        }
        let retry = RetryConfig::from_spec(&spec.retry_config)?;
        let rate = RateLimits::from_spec(&spec.rate_limits)?;

        let mut queues = self.queues.write();
        match queues.get(&name) {
            Lookup::Live(_) => return Err(EmulatorError::AlreadyExists(QUEUE_EXISTS.to_string())),
            Lookup::Tombstoned => {
                return Err(EmulatorError::FailedPrecondition(QUEUE_TOO_RECENT.to_string()));
            }
            Lookup::Absent => {}
        }

        let queue = Queue::new(
            name.clone(),
            retry,
            rate,
            self.services.clone(),
            self.events.clone(),
        );
        queue.run();
        let record = queue.snapshot();
        queues.insert(name, queue);

        info!(queue = %record.name, ?retry, ?rate, "queue created");
        Ok(record)
    }

    pub fn get_queue(&self, name: &str) -> Result<QueueRecord, EmulatorError> {
        Ok(self.live_queue(name)?.snapshot())
    }

    /// Live queues under `parent`, ordered by name.
    pub fn list_queues(&self, parent: &str) -> Result<Vec<QueueRecord>, EmulatorError> {
        let parent: LocationName = parent.parse()?;
        let mut records: Vec<QueueRecord> = self
            .queues
            .read()
            .live()
            .filter(|(name, _)| name.location() == parent)
            .map(|(_, queue)| queue.snapshot())
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn update_queue(&self, _spec: QueueSpec) -> Result<QueueRecord, EmulatorError> {
        Err(EmulatorError::not_implemented())
    }

    /// Delete the queue and every task in it. The name stays tombstoned.
    pub fn delete_queue(&self, name: &str) -> Result<(), EmulatorError> {
        let name: QueueName = name.parse()?;
        let queue = {
            let mut queues = self.queues.write();
            if !matches!(queues.get(&name), Lookup::Live(_)) {
                return Err(EmulatorError::NotFound(QUEUE_NOT_FOUND.to_string()));
            }
            queues.tombstone(name)
        };
        if let Some(queue) = queue {
            queue.delete();
        }
        Ok(())
    }

    pub fn purge_queue(&self, name: &str) -> Result<QueueRecord, EmulatorError> {
        Ok(self.live_queue(name)?.purge())
    }

    pub fn pause_queue(&self, name: &str) -> Result<QueueRecord, EmulatorError> {
        self.live_queue(name)?.pause()
    }

    pub fn resume_queue(&self, name: &str) -> Result<QueueRecord, EmulatorError> {
        self.live_queue(name)?.resume()
    }

    fn live_queue(&self, name: &str) -> Result<Arc<Queue>, EmulatorError> {
        let name: QueueName = name.parse()?;
        match self.queues.read().get(&name) {
            Lookup::Live(queue) => Ok(Arc::clone(queue)),
            Lookup::Tombstoned | Lookup::Absent => {
                Err(EmulatorError::NotFound(QUEUE_NOT_FOUND.to_string()))
            }
        }
    }

    // ----- tasks -----

    pub fn create_task(&self, queue: &str, spec: TaskSpec) -> Result<TaskRecord, EmulatorError> {
        let queue_name: QueueName = queue.parse()?;
        let queue = match self.queues.read().get(&queue_name) {
            Lookup::Live(queue) => Arc::clone(queue),
            Lookup::Tombstoned => {
                return Err(EmulatorError::FailedPrecondition(PARENT_QUEUE_GONE.to_string()));
            }
            Lookup::Absent => return Err(EmulatorError::NotFound(PARENT_QUEUE_MISSING.to_string())),
        };

        // Held across creation so the completion tombstone can't overtake the insert.
        let mut tasks = self.tasks.write();
        if let Some(raw) = spec.name.as_deref().filter(|n| !n.is_empty()) {
            let name: TaskName = raw.parse()?;
            match tasks.get(&name) {
                Lookup::Live(task) if task.finalize_reason().is_none() => {
                    return Err(EmulatorError::AlreadyExists(TASK_EXISTS.to_string()));
                }
                Lookup::Live(_) | Lookup::Tombstoned => {
                    return Err(EmulatorError::FailedPrecondition(TASK_TOO_RECENT.to_string()));
                }
                Lookup::Absent => {}
            }
        }

        let (task, record) = queue.new_task(spec)?;
        tasks.insert(record.name.clone(), task);
        Ok(record)
    }

    pub fn get_task(&self, name: &str) -> Result<TaskRecord, EmulatorError> {
        match self.lookup_task(name)? {
            TaskLookup::Live(task) => Ok(task.snapshot()),
            TaskLookup::Gone => Err(EmulatorError::FailedPrecondition(TASK_GONE.to_string())),
            TaskLookup::Absent => Err(EmulatorError::NotFound(TASK_MISSING.to_string())),
        }
    }

    /// Handle on a live task, e.g. to await its finalization.
    pub fn task(&self, name: &str) -> Result<Arc<Task>, EmulatorError> {
        self.live_task(name)
    }

    /// Snapshots of the live tasks of `queue`, ordered by name.
    pub fn list_tasks(&self, queue: &str) -> Result<Vec<TaskRecord>, EmulatorError> {
        let queue = self.live_queue(queue)?;
        Ok(queue.list_tasks())
    }

    /// Cancel the task. It is tombstoned once finalized.
    pub fn delete_task(&self, name: &str) -> Result<(), EmulatorError> {
        self.live_task(name)?.delete();
        Ok(())
    }

    /// Dispatch the task now, outside the queue's scheduling. Returns the
    /// state right after the attempt is recorded.
    pub fn run_task(&self, name: &str) -> Result<TaskRecord, EmulatorError> {
        let task = self.live_task(name)?;
        info!(task = %task.name(), "task run requested");
        task.run()
    }

    fn live_task(&self, name: &str) -> Result<Arc<Task>, EmulatorError> {
        match self.lookup_task(name)? {
            TaskLookup::Live(task) => Ok(task),
            TaskLookup::Gone => Err(EmulatorError::NotFound(TASK_GONE.to_string())),
            TaskLookup::Absent => Err(EmulatorError::NotFound(TASK_MISSING.to_string())),
        }
    }

    /// Finalized tasks count as gone even before their tombstone lands.
    fn lookup_task(&self, name: &str) -> Result<TaskLookup, EmulatorError> {
        let name: TaskName = name.parse()?;
        Ok(match self.tasks.read().get(&name) {
            Lookup::Live(task) if task.finalize_reason().is_none() => {
                TaskLookup::Live(Arc::clone(task))
            }
            Lookup::Live(_) | Lookup::Tombstoned => TaskLookup::Gone,
            Lookup::Absent => TaskLookup::Absent,
        })
    }
}

async fn tombstone_removed_tasks(
    tasks: Weak<TaskMap>,
    mut events: mpsc::UnboundedReceiver<QueueEvent>,
) {
    while let Some(QueueEvent::TaskRemoved { name, reason }) = events.recv().await {
        let Some(tasks) = tasks.upgrade() else {
            break;
        };
        debug!(task = %name, ?reason, "task tombstoned");
        tasks.write().tombstone(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rstest::rstest;

    use crate::domain::{
        AppEngineHttpRequest, AppEngineRouting, Code, DispatchTarget, FinalizeReason, QueueState,
        RetrySpec,
    };
    use crate::ports::{SequentialIdGenerator, TokioClock};
    use crate::queue::testing::{EPOCH, ScriptedDispatcher, http_spec};

    const PARENT: &str = "projects/p/locations/l";
    const QUEUE: &str = "projects/p/locations/l/queues/q";

    fn emulator(dispatcher: Arc<ScriptedDispatcher>) -> Emulator {
        Emulator::builder()
            .dispatcher(dispatcher)
            .clock(TokioClock::new(EPOCH))
            .id_generator(SequentialIdGenerator::new(1))
            .build()
            .unwrap()
    }

    fn with_queue(dispatcher: Arc<ScriptedDispatcher>) -> Emulator {
        let emulator = emulator(dispatcher);
        emulator.create_queue(PARENT, QueueSpec::new(QUEUE)).unwrap();
        emulator
    }

    fn later(secs: u64) -> TaskSpec {
        http_spec().with_schedule_time(EPOCH.saturating_add(Duration::from_secs(secs)))
    }

    #[tokio::test(start_paused = true)]
    async fn create_get_and_list_queues() {
        let emulator = emulator(ScriptedDispatcher::new([200]));
        let created = emulator
            .create_queue(
                PARENT,
                QueueSpec::new(QUEUE).with_retry(RetrySpec {
                    max_attempts: Some(3),
                    ..Default::default()
                }),
            )
            .unwrap();
        emulator
            .create_queue(PARENT, QueueSpec::new("projects/p/locations/l/queues/a"))
            .unwrap();
        emulator
            .create_queue(
                "projects/p/locations/other",
                QueueSpec::new("projects/p/locations/other/queues/z"),
            )
            .unwrap();

        assert_eq!(created.state, QueueState::Running);
        assert_eq!(created.retry_config.max_attempts, 3);
        assert_eq!(created.rate_limits, RateLimits::default());
        assert_eq!(emulator.get_queue(QUEUE).unwrap(), created);

        let names: Vec<String> = emulator
            .list_queues(PARENT)
            .unwrap()
            .into_iter()
            .map(|q| q.name.to_string())
            .collect();
        assert_eq!(
            names,
            vec!["projects/p/locations/l/queues/a", "projects/p/locations/l/queues/q"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queue_names_conflict_while_live_and_after_deletion() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));

        let err = emulator.create_queue(PARENT, QueueSpec::new(QUEUE)).unwrap_err();
        assert_eq!(err, EmulatorError::AlreadyExists("Queue already exists".to_string()));

        emulator.delete_queue(QUEUE).unwrap();
        let err = emulator.create_queue(PARENT, QueueSpec::new(QUEUE)).unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);

        for err in [
            emulator.get_queue(QUEUE).unwrap_err(),
            emulator.delete_queue(QUEUE).unwrap_err(),
            emulator.pause_queue(QUEUE).unwrap_err(),
            emulator.purge_queue(QUEUE).unwrap_err(),
            emulator.list_tasks(QUEUE).unwrap_err(),
        ] {
            assert_eq!(err, EmulatorError::NotFound("Requested entity was not found.".to_string()));
        }
        assert!(emulator.list_queues(PARENT).unwrap().is_empty());
    }

    #[rstest]
    #[case("projects/p/locations/l", "projects/p/locations/l/queues/bad_id")]
    #[case("projects/p/locations/l", "projects/p/locations/elsewhere/queues/q")]
    #[case("projects/p", "projects/p/locations/l/queues/q")]
    #[tokio::test(start_paused = true)]
    async fn malformed_queue_requests_are_invalid_argument(
        #[case] parent: &str,
        #[case] name: &str,
    ) {
        let emulator = emulator(ScriptedDispatcher::new([200]));
        let err = emulator.create_queue(parent, QueueSpec::new(name)).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_policy_is_rejected() {
        let emulator = emulator(ScriptedDispatcher::new([200]));
        let spec = QueueSpec::new(QUEUE).with_retry(RetrySpec {
            min_backoff: Some(-1.0),
            ..Default::default()
        });
        assert_eq!(
            emulator.create_queue(PARENT, spec).unwrap_err().code(),
            Code::InvalidArgument
        );
        assert!(emulator.get_queue(QUEUE).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn update_queue_is_unimplemented() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        let err = emulator.update_queue(QueueSpec::new(QUEUE)).unwrap_err();
        assert_eq!(err, EmulatorError::Unimplemented("Not yet implemented".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_report_state() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        assert_eq!(emulator.pause_queue(QUEUE).unwrap().state, QueueState::Paused);
        assert_eq!(emulator.get_queue(QUEUE).unwrap().state, QueueState::Paused);
        assert_eq!(emulator.resume_queue(QUEUE).unwrap().state, QueueState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn create_task_requires_a_live_queue() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));

        let err = emulator
            .create_task("projects/p/locations/l/queues/missing", http_spec())
            .unwrap_err();
        assert_eq!(err, EmulatorError::NotFound("Queue does not exist.".to_string()));

        emulator.delete_queue(QUEUE).unwrap();
        let err = emulator.create_task(QUEUE, http_spec()).unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_task_is_gone_not_missing() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        let record = emulator.create_task(QUEUE, http_spec()).unwrap();
        let name = record.name.to_string();

        let task = emulator.task(&name).unwrap();
        assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);

        let err = emulator.get_task(&name).unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);
        assert!(err.to_string().starts_with("The task no longer exists"));

        for err in [
            emulator.delete_task(&name).unwrap_err(),
            emulator.run_task(&name).unwrap_err(),
        ] {
            assert_eq!(err.code(), Code::NotFound);
            assert!(err.to_string().starts_with("The task no longer exists"));
        }

        let missing = format!("{QUEUE}/tasks/999");
        assert_eq!(
            emulator.get_task(&missing).unwrap_err(),
            EmulatorError::NotFound("Task does not exist.".to_string())
        );

        // The tombstone lands too.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(matches!(
            emulator.tasks.read().get(&record.name),
            Lookup::Tombstoned
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_task_names_conflict_while_live_and_after_completion() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        let name = format!("{QUEUE}/tasks/job-1");

        emulator
            .create_task(QUEUE, later(60).with_name(name.clone()))
            .unwrap();
        let err = emulator
            .create_task(QUEUE, later(60).with_name(name.clone()))
            .unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);

        emulator.delete_task(&name).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let err = emulator
            .create_task(QUEUE, later(60).with_name(name.clone()))
            .unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);
    }

    #[tokio::test(start_paused = true)]
    async fn task_from_another_queue_is_rejected() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        let err = emulator
            .create_task(
                QUEUE,
                http_spec().with_name("projects/p/locations/l/queues/other/tasks/1"),
            )
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test(start_paused = true)]
    async fn run_task_returns_the_dispatched_snapshot() {
        let dispatcher = ScriptedDispatcher::with_latency([200], Duration::from_secs(2));
        let emulator = with_queue(dispatcher.clone());
        let record = emulator.create_task(QUEUE, later(3600)).unwrap();

        let snapshot = emulator.run_task(&record.name.to_string()).unwrap();
        assert_eq!(snapshot.dispatch_count, 1);
        assert!(snapshot.last_attempt.as_ref().unwrap().dispatch_time.is_some());
        assert!(snapshot.last_attempt.as_ref().unwrap().response_time.is_none());

        let task = emulator.task(&record.name.to_string()).unwrap();
        assert_eq!(task.wait_finalized().await, FinalizeReason::Succeeded);
        assert_eq!(dispatcher.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_tasks_shows_live_tasks_only() {
        let emulator = with_queue(ScriptedDispatcher::new([200]));
        let waiting = emulator.create_task(QUEUE, later(600)).unwrap();
        let done = emulator.create_task(QUEUE, http_spec()).unwrap();

        emulator
            .task(&done.name.to_string())
            .unwrap()
            .wait_finalized()
            .await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let listed = emulator.list_tasks(QUEUE).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, waiting.name);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_a_queue_tombstones_its_tasks() {
        let dispatcher = ScriptedDispatcher::new([200]);
        let emulator = with_queue(dispatcher.clone());
        let record = emulator.create_task(QUEUE, later(60)).unwrap();
        let task = emulator.task(&record.name.to_string()).unwrap();

        emulator.delete_queue(QUEUE).unwrap();

        assert_eq!(task.wait_finalized().await, FinalizeReason::Cancelled);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(
            emulator.get_task(&record.name.to_string()).unwrap_err().code(),
            Code::FailedPrecondition
        );
        assert_eq!(dispatcher.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn routed_targets_use_the_configured_host() {
        let emulator = Emulator::builder()
            .dispatcher(ScriptedDispatcher::new([200]))
            .clock(TokioClock::new(EPOCH))
            .app_engine_emulator_host("http://localhost:9090")
            .build()
            .unwrap();
        emulator.create_queue(PARENT, QueueSpec::new(QUEUE)).unwrap();

        let spec = TaskSpec::new(DispatchTarget::AppEngine(AppEngineHttpRequest {
            relative_uri: "/work".to_string(),
            app_engine_routing: Some(AppEngineRouting {
                service: "worker".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }))
        .with_schedule_time(EPOCH.saturating_add(Duration::from_secs(60)));
        let record = emulator.create_task(QUEUE, spec).unwrap();

        assert_eq!(record.target.url(), "http://worker.localhost:9090/work");
        assert!(record.name.task_id().chars().all(|c| c.is_ascii_digit()));
    }
}
