//! taskemu-core
//!
//! In-process emulator of a managed HTTP task-queue service.
//!
//! - **domain**: names, timestamps, statuses, dispatch targets, records, events
//! - **ports**: `Dispatcher`, `Clock`, `TaskIdGenerator`
//! - **impls**: `HttpDispatcher`
//! - **queue**: task lifecycle, retry/backoff and the admission loop
//! - **app**: `Emulator` (queues and tasks by name, with tombstones)
//! - **config**: `EmulatorConfig`
//! - **observability**: queue statistics

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{BuildError, Emulator, EmulatorBuilder};
pub use config::EmulatorConfig;
