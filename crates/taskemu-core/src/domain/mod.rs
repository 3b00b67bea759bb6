//! Domain model: names, timestamps, statuses, targets, records and events.

pub mod attempt;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod queue;
pub mod rate;
pub mod retry;
pub mod state;
pub mod status;
pub mod target;
pub mod task;
pub mod time;

pub use attempt::Attempt;
pub use decision::Decision;
pub use errors::{ConfigError, EmulatorError};
pub use events::{QueueEvent, TaskEvent};
pub use ids::{LocationName, QueueName, TaskName};
pub use queue::{QueueRecord, QueueSpec, QueueState, RateSpec, RetrySpec};
pub use rate::{
    DEFAULT_MAX_BURST_SIZE, DEFAULT_MAX_CONCURRENT_DISPATCHES, DEFAULT_MAX_DISPATCHES_PER_SECOND,
    RateLimits,
};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_DOUBLINGS, DEFAULT_MIN_BACKOFF,
    RetryConfig,
};
pub use state::{FinalizeReason, TaskPhase};
pub use status::{Code, DISPATCH_FAILED, Status};
pub use target::{
    AppEngineHttpRequest, AppEngineRouting, DispatchTarget, Headers, HttpMethod, HttpRequest,
};
pub use task::{DEFAULT_DISPATCH_DEADLINE, TaskRecord, TaskSpec, TaskView};
pub use time::Timestamp;
