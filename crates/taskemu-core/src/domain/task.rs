//! Task data: creation spec and the mutable record a running task owns.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::attempt::Attempt;
use super::errors::EmulatorError;
use super::ids::{QueueName, TaskName};
use super::retry::RetryConfig;
use super::status::Status;
use super::target::{DispatchTarget, set_header};
use super::time::Timestamp;

/// Dispatch deadline used when the task does not set one.
pub const DEFAULT_DISPATCH_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskView {
    #[default]
    Basic,
    Full,
}

/// What a client submits when creating a task. Unset fields are filled in by
/// the task constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Full task name. Generated when absent.
    #[serde(default)]
    pub name: Option<String>,

    pub target: DispatchTarget,

    #[serde(default)]
    pub schedule_time: Option<Timestamp>,

    #[serde(default)]
    pub dispatch_deadline: Option<Duration>,
}

impl TaskSpec {
    pub fn new(target: DispatchTarget) -> Self {
        Self {
            name: None,
            target,
            schedule_time: None,
            dispatch_deadline: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schedule_time(mut self, schedule_time: Timestamp) -> Self {
        self.schedule_time = Some(schedule_time);
        self
    }

    pub fn with_dispatch_deadline(mut self, deadline: Duration) -> Self {
        self.dispatch_deadline = Some(deadline);
        self
    }
}

/// The state of one task.
///
/// `Task` keeps this behind its lock; every clone handed out is a frozen
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: TaskName,
    pub target: DispatchTarget,
    pub create_time: Timestamp,
    pub schedule_time: Timestamp,
    pub dispatch_deadline: Duration,
    pub dispatch_count: u32,
    pub response_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_attempt: Option<Attempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<Attempt>,
    pub view: TaskView,
}

impl TaskRecord {
    /// Build the initial record for `spec` in `queue`.
    ///
    /// - absent name: `<queue>/tasks/<generate_id()>`
    /// - `create_time`: `now`, whole seconds only
    /// - absent schedule time: `now`
    /// - absent dispatch deadline: [`DEFAULT_DISPATCH_DEADLINE`]
    /// - target defaults via [`DispatchTarget::normalize`]
    pub fn create(
        spec: TaskSpec,
        queue: &QueueName,
        now: Timestamp,
        host_override: Option<&str>,
        generate_id: impl FnOnce() -> String,
    ) -> Result<Self, EmulatorError> {
        let name = match spec.name.as_deref().filter(|n| !n.is_empty()) {
            Some(raw) => {
                let name: TaskName = raw.parse()?;
                if name.queue() != queue {
                    return Err(EmulatorError::InvalidArgument(format!(
                        "Task name {name} does not belong to queue {queue}"
                    )));
                }
                name
            }
            None => queue.task(&generate_id())?,
        };

        let mut target = spec.target;
        target.normalize(queue, host_override);

        Ok(Self {
            name,
            target,
            create_time: now.truncated_to_seconds(),
            schedule_time: spec.schedule_time.unwrap_or(now),
            dispatch_deadline: spec.dispatch_deadline.unwrap_or(DEFAULT_DISPATCH_DEADLINE),
            dispatch_count: 0,
            response_count: 0,
            first_attempt: None,
            last_attempt: None,
            view: TaskView::Basic,
        })
    }

    /// Record a new attempt dispatched at `now`, due at the current schedule time.
    pub fn start_attempt(&mut self, now: Timestamp) {
        self.dispatch_count = self.dispatch_count.saturating_add(1);
        if self.first_attempt.is_none() {
            self.first_attempt = Some(Attempt {
                dispatch_time: Some(now),
                ..Default::default()
            });
        }
        self.last_attempt = Some(Attempt::dispatched(self.schedule_time, now));
    }

    /// Record the result of the most recent attempt.
    pub fn finish_attempt(&mut self, now: Timestamp, http_status: i32) {
        if let Some(last) = self.last_attempt.as_mut() {
            last.complete(now, Status::from_http_status(http_status));
        }
        self.response_count = self.response_count.saturating_add(1);
    }

    /// The target as sent for the current attempt: the stored target plus the
    /// per-attempt task headers. The stored target is left untouched.
    pub fn outbound_target(&self) -> DispatchTarget {
        let mut target = self.target.clone();
        let prefix = target.task_header_prefix();
        let headers = target.headers_mut();
        set_header(headers, &format!("{prefix}QueueName"), self.name.queue().queue_id());
        set_header(headers, &format!("{prefix}TaskName"), self.name.task_id());
        set_header(
            headers,
            &format!("{prefix}TaskRetryCount"),
            self.dispatch_count.saturating_sub(1).to_string(),
        );
        set_header(
            headers,
            &format!("{prefix}TaskExecutionCount"),
            self.response_count.to_string(),
        );
        set_header(
            headers,
            &format!("{prefix}TaskETA"),
            format!("{:.6}", self.schedule_time.as_epoch_secs_f64()),
        );
        target
    }

    /// Move the schedule time forward by the policy's backoff for the current
    /// dispatch count. Returns the backoff applied.
    pub fn schedule_retry(&mut self, retry: &RetryConfig) -> Duration {
        let backoff = retry.backoff(self.dispatch_count);
        self.schedule_time = self.schedule_time.saturating_add(backoff);
        backoff
    }
}
