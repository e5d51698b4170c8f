//! Configuration module for metricq.
//!
//! Handles the settings file, environment variable expansion and defaults.

mod settings;

pub use settings::{
    expand_env_vars, LoggingSettings, MeterSettings, MetricsSettings, Settings, SettingsError,
};
