//! Admission loop: dispatch rate (token bucket) and concurrency.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::Task;
use crate::domain::{QueueName, QueueState, RateLimits};
use crate::observability::DispatchCounters;

/// Token bucket refilling one token every `1 / max_dispatches_per_second`
/// seconds, holding at most `max_burst_size` tokens.
pub(crate) fn rate_limiter(limits: &RateLimits) -> DefaultDirectRateLimiter {
    let burst = NonZeroU32::new(limits.max_burst_size).unwrap_or(NonZeroU32::MIN);
    let quota = Duration::try_from_secs_f64(1.0 / limits.max_dispatches_per_second)
        .ok()
        .and_then(Quota::with_period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}

/// Pool of in-flight attempt permits.
pub(crate) fn dispatch_permits(limits: &RateLimits) -> Arc<Semaphore> {
    let permits = usize::try_from(limits.max_concurrent_dispatches)
        .unwrap_or(Semaphore::MAX_PERMITS)
        .clamp(1, Semaphore::MAX_PERMITS);
    Arc::new(Semaphore::new(permits))
}

pub(crate) struct Admission {
    pub queue: QueueName,
    pub limiter: DefaultDirectRateLimiter,
    pub permits: Arc<Semaphore>,
    pub state: watch::Receiver<QueueState>,
    pub shutdown: CancellationToken,
    pub counters: Arc<DispatchCounters>,
}

impl Admission {
    pub(crate) async fn run(mut self, mut ready: mpsc::UnboundedReceiver<Arc<Task>>) {
        debug!(queue = %self.queue, "admission loop started");
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                task = ready.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            if !self.wait_until_running(&task).await {
                continue;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.limiter.until_ready() => {}
            }
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // The queue may have been paused while this task waited for a
            // token or a permit. Hold it again, permit in hand.
            if !self.wait_until_running(&task).await {
                continue;
            }
            if !task.begin_dispatch() {
                continue;
            }

            self.counters.started();
            let counters = Arc::clone(&self.counters);
            tokio::spawn(async move {
                task.attempt().await;
                counters.finished();
                drop(permit);
            });
        }
        debug!(queue = %self.queue, "admission loop stopped");
    }

    /// Hold `task` while the queue is paused. `false` when the task was
    /// cancelled or the queue shut down in the meantime.
    async fn wait_until_running(&mut self, task: &Task) -> bool {
        loop {
            match *self.state.borrow_and_update() {
                QueueState::Running => return true,
                QueueState::Deleted => return false,
                QueueState::Paused => {}
            }
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return false,
                _ = task.cancelled() => return false,
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}
