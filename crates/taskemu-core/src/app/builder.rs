//! EmulatorBuilder: wires the emulator's collaborators.

use std::sync::Arc;

use super::registry::Emulator;
use crate::config::EmulatorConfig;
use crate::impls::HttpDispatcher;
use crate::ports::{Clock, Dispatcher, RandomIdGenerator, SystemClock, TaskIdGenerator};
use crate::queue::Services;

/// Builds an [`Emulator`].
///
/// # Example
/// ```ignore
/// let emulator = Emulator::builder()
///     .config(EmulatorConfig::from_env()?)
///     .build()?;
/// ```
///
/// Unset collaborators default to real ones: [`HttpDispatcher`],
/// [`SystemClock`] and [`RandomIdGenerator`].
#[derive(Default)]
pub struct EmulatorBuilder {
    config: EmulatorConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn TaskIdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl EmulatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EmulatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for setting `app_engine_emulator_host` on the config.
    pub fn app_engine_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.config.app_engine_emulator_host = Some(host.into());
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn id_generator(mut self, ids: impl TaskIdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Emulator, BuildError> {
        let dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Arc::new(HttpDispatcher::new(self.config.http_connect_timeout)?),
        };
        let services = Services {
            dispatcher,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            ids: self.ids.unwrap_or_else(|| Arc::new(RandomIdGenerator)),
            host_override: self.config.app_engine_emulator_host,
        };
        Ok(Emulator::new(services))
    }
}
