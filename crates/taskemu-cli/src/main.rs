use std::error::Error;
use std::time::Duration;

use taskemu_core::domain::{DispatchTarget, HttpRequest, QueueSpec, RetrySpec, TaskSpec};
use taskemu_core::ports::{Clock, SystemClock};
use taskemu_core::{Emulator, EmulatorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PARENT: &str = "projects/demo/locations/local";
const QUEUE: &str = "projects/demo/locations/local/queues/default";
const ENV_DEMO_URL: &str = "TASKEMU_DEMO_URL";
const DEFAULT_DEMO_URL: &str = "http://localhost:8080/";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // (A) config + logging; RUST_LOG wins over TASKEMU_LOG
    let config = EmulatorConfig::from_env()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // (B) emulator with real HTTP dispatch
    let emulator = Emulator::builder().config(config).build()?;

    // (C) one queue; a handful of quick retries so a dead endpoint finishes soon
    let retry = RetrySpec {
        max_attempts: Some(3),
        min_backoff: Some(0.5),
        max_backoff: Some(2.0),
        max_doublings: Some(2),
    };
    let queue = emulator.create_queue(PARENT, QueueSpec::new(QUEUE).with_retry(retry))?;
    info!(queue = %queue.name, "queue created");

    // (D) one task against the demo endpoint, due shortly so the handle below
    // is taken while it is still pending
    let url = std::env::var(ENV_DEMO_URL).unwrap_or_else(|_| DEFAULT_DEMO_URL.to_string());
    let target = DispatchTarget::Http(HttpRequest {
        url,
        body: b"hello from taskemu".to_vec(),
        ..Default::default()
    });
    let due = SystemClock.now().saturating_add(Duration::from_millis(500));
    let spec = TaskSpec::new(target)
        .with_schedule_time(due)
        .with_dispatch_deadline(Duration::from_secs(30));
    let created = emulator.create_task(QUEUE, spec)?;
    info!(task = %created.name, "task created");

    // (E) wait for the task to finish, then show what it looked like
    let task = emulator.task(&created.name.to_string())?;
    let reason = task.wait_finalized().await;
    let record = task.snapshot();
    info!(task = %record.name, ?reason, dispatch_count = record.dispatch_count, "task finalized");
    println!("{}", serde_json::to_string_pretty(&record)?);

    emulator.delete_queue(QUEUE)?;
    Ok(())
}
