//! Emulator configuration, read from the environment.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

pub const ENV_APP_ENGINE_EMULATOR_HOST: &str = "APP_ENGINE_EMULATOR_HOST";
pub const ENV_LOG: &str = "TASKEMU_LOG";
pub const ENV_HTTP_CONNECT_TIMEOUT_SECS: &str = "TASKEMU_HTTP_CONNECT_TIMEOUT_SECS";

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Base host for routed targets instead of `<project>.appspot.com`.
    /// May carry a scheme (`http://localhost:8080`).
    pub app_engine_emulator_host: Option<String>,

    /// Default `tracing` filter for binaries.
    pub log_filter: String,

    /// Connect timeout of the outbound HTTP client.
    pub http_connect_timeout: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            app_engine_emulator_host: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            http_connect_timeout: DEFAULT_HTTP_CONNECT_TIMEOUT,
        }
    }
}

impl EmulatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut envs = HashMap::new();
        for key in [
            ENV_APP_ENGINE_EMULATOR_HOST,
            ENV_LOG,
            ENV_HTTP_CONNECT_TIMEOUT_SECS,
        ] {
            if let Ok(value) = std::env::var(key) {
                envs.insert(key.to_string(), value);
            }
        }
        Self::from_env_map(&envs)
    }

    fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| {
            envs.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let http_connect_timeout = match get(ENV_HTTP_CONNECT_TIMEOUT_SECS) {
            None => defaults.http_connect_timeout,
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_HTTP_CONNECT_TIMEOUT_SECS,
                    value: raw,
                })?,
        };

        Ok(Self {
            app_engine_emulator_host: get(ENV_APP_ENGINE_EMULATOR_HOST),
            log_filter: get(ENV_LOG).unwrap_or(defaults.log_filter),
            http_connect_timeout,
        })
    }
}
