//! Resource names.
//!
//! - location: `projects/<project>/locations/<location>`
//! - queue:    `projects/<project>/locations/<location>/queues/<queue>`
//! - task:     `<queue>/tasks/<task>`
//!
//! Project, location and queue ids are `[A-Za-z0-9-]+`. Task ids are
//! `[A-Za-z0-9_-]{1,500}`; generated ids are decimal `u64`s.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::EmulatorError;

const MAX_TASK_ID_LEN: usize = 500;

fn is_resource_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_task_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_TASK_ID_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `projects/<project>/locations/<location>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationName {
    project: String,
    location: String,
}

impl LocationName {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl FromStr for LocationName {
    type Err = EmulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location]
                if is_resource_id(project) && is_resource_id(location) =>
            {
                Ok(Self {
                    project: project.to_string(),
                    location: location.to_string(),
                })
            }
            _ => Err(EmulatorError::InvalidArgument(
                "Invalid resource field value in the request.".to_string(),
            )),
        }
    }
}

impl fmt::Display for LocationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/locations/{}", self.project, self.location)
    }
}

/// `projects/<project>/locations/<location>/queues/<queue>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Vec<&str> {
        self.0.split('/').collect()
    }

    pub fn project(&self) -> &str {
        self.segments()[1]
    }

    pub fn location(&self) -> LocationName {
        let segments = self.segments();
        LocationName {
            project: segments[1].to_string(),
            location: segments[3].to_string(),
        }
    }

    pub fn queue_id(&self) -> &str {
        self.segments()[5]
    }

    /// Task name `<queue>/tasks/<task_id>`. `task_id` must be a valid task id.
    pub fn task(&self, task_id: &str) -> Result<TaskName, EmulatorError> {
        format!("{}/tasks/{}", self.0, task_id).parse()
    }
}

impl FromStr for QueueName {
    type Err = EmulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["projects", project, "locations", location, "queues", queue]
                if is_resource_id(project) && is_resource_id(location) && is_resource_id(queue) =>
            {
                Ok(Self(s.to_string()))
            }
            _ => Err(EmulatorError::InvalidArgument(
                "Queue name must be formatted: \"projects/<PROJECT_ID>/locations/<LOCATION_ID>/queues/<QUEUE_ID>\""
                    .to_string(),
            )),
        }
    }
}

impl TryFrom<String> for QueueName {
    type Error = EmulatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `<queue>/tasks/<task>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskName {
    queue: QueueName,
    task_id: String,
}

impl TaskName {
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl FromStr for TaskName {
    type Err = EmulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            EmulatorError::InvalidArgument(
                "Task name must be formatted: \"projects/<PROJECT_ID>/locations/<LOCATION_ID>/queues/<QUEUE_ID>/tasks/<TASK_ID>\""
                    .to_string(),
            )
        };
        let (queue, task_id) = s.rsplit_once("/tasks/").ok_or_else(invalid)?;
        if !is_task_id(task_id) {
            return Err(invalid());
        }
        let queue = queue.parse::<QueueName>().map_err(|_| invalid())?;
        Ok(Self {
            queue,
            task_id: task_id.to_string(),
        })
    }
}

impl TryFrom<String> for TaskName {
    type Error = EmulatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskName> for String {
    fn from(value: TaskName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tasks/{}", self.queue, self.task_id)
    }
}
