//! Binary-level configuration: logging knobs plus the scheduler's own constants, loaded from
//! one layered source the same way the workspace's other binaries load theirs.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use scheduler_core::SchedulerConfig;
use serde::Deserialize;

/// Top-level configuration for the `scheduler` binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub log_json: bool,
    pub log_target: bool,
    pub log_line_number: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            log_level: "info".to_string(),
            log_json: false,
            log_target: false,
            log_line_number: false,
        }
    }
}

impl Config {
    /// Load configuration from `config/scheduler.toml` (optional), an optional caller-supplied
    /// override file, and `SCHEDULER__*` environment variables, layered over defaults.
    ///
    /// Example environment variable: `SCHEDULER__MONITORING__LOG_LEVEL=debug`
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigLoader::builder()
            .add_source(File::with_name("config/scheduler").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("SCHEDULER").separator("__"))
            .build()?
            .try_deserialize()
    }
}
