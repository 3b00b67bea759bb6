//! Test doubles shared by the engine and registry tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::Services;
use crate::domain::{DispatchTarget, HttpRequest, TaskSpec, Timestamp};
use crate::ports::{Dispatcher, SequentialIdGenerator, TokioClock};

/// One call seen by [`ScriptedDispatcher`].
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub at: Instant,
    pub target: DispatchTarget,
    pub deadline: Duration,
}

/// Answers with queued statuses (the last one repeats), after `latency`.
#[derive(Debug)]
pub(crate) struct ScriptedDispatcher {
    statuses: Mutex<VecDeque<i32>>,
    latency: Duration,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedDispatcher {
    pub fn new(statuses: impl IntoIterator<Item = i32>) -> Arc<Self> {
        Self::with_latency(statuses, Duration::ZERO)
    }

    pub fn with_latency(statuses: impl IntoIterator<Item = i32>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            latency,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_status(&self) -> i32 {
        let mut statuses = self.statuses.lock();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or(200)
        } else {
            statuses.front().copied().unwrap_or(200)
        }
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, target: &DispatchTarget, deadline: Duration) -> i32 {
        self.calls.lock().push(Call {
            at: Instant::now(),
            target: target.clone(),
            deadline,
        });
        let status = self.next_status();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        status
    }
}

pub(crate) const EPOCH: Timestamp = Timestamp::from_seconds(1_700_000_000);

pub(crate) fn services(dispatcher: Arc<ScriptedDispatcher>) -> Services {
    Services {
        dispatcher,
        clock: Arc::new(TokioClock::new(EPOCH)),
        ids: Arc::new(SequentialIdGenerator::new(1)),
        host_override: None,
    }
}

pub(crate) fn http_spec() -> TaskSpec {
    TaskSpec::new(DispatchTarget::Http(HttpRequest {
        url: "http://worker.test/handle".to_string(),
        headers: BTreeMap::new(),
        ..Default::default()
    }))
}

/// Millisecond tolerance for timer assertions.
pub(crate) fn assert_close(actual: Duration, expected: Duration) {
    let diff = actual.abs_diff(expected);
    assert!(
        diff <= Duration::from_millis(5),
        "expected {expected:?}, got {actual:?}"
    );
}
