//! TOML-based configuration for metricq.
//!
//! Supports a config file (metricq.toml) with environment variable expansion
//! in string values.
//!
//! Example configuration:
//! ```toml
//! [metrics]
//! database = "signoz_metrics"
//! interpolation_enabled = false
//! normalized_filter = false
//!
//! [meter]
//! database = "${METER_DB}"  # expanded from the environment
//!
//! [logging]
//! filter = "metricq=debug"
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub metrics: MetricsSettings,
    pub meter: MeterSettings,
    pub logging: LoggingSettings,
}

/// Settings for the metrics statement builder.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Database holding the samples and time-series tables.
    pub database: String,

    /// Use the interpolating rate/increase expressions, which estimate the
    /// first bucket of each series from the next sample.
    pub interpolation_enabled: bool,

    /// Value matched against the `__normalized` column of the time-series table.
    pub normalized_filter: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            database: "signoz_metrics".to_string(),
            interpolation_enabled: false,
            normalized_filter: false,
        }
    }
}

/// Settings for the meter statement builder.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MeterSettings {
    pub database: String,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            database: "signoz_meter".to_string(),
        }
    }
}

/// Logging configuration for the CLI.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "METRICQ_CONFIG";

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z0-9_]+)").expect("env reference pattern is valid")
});

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SettingsError::FileNotFound(path.to_path_buf()),
            _ => SettingsError::ReadError(e),
        })?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text and expand environment variables.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.resolved()
    }

    /// Load settings from `METRICQ_CONFIG`, else the first existing file in
    /// [`search_paths`](Self::search_paths), else defaults.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(path);
        }
        match Self::search_paths().into_iter().find(|p| p.exists()) {
            Some(path) => Self::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    /// `./metricq.toml`, then `<config dir>/metricq/config.toml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("metricq.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("metricq").join("config.toml"));
        }
        paths
    }

    fn resolved(mut self) -> Result<Self, SettingsError> {
        self.metrics.database = expand_env_vars(&self.metrics.database)?;
        self.meter.database = expand_env_vars(&self.meter.database)?;
        self.validate()?;
        Ok(self)
    }

    /// Database names are spliced into statement text, so they must be
    /// plain identifiers.
    fn validate(&self) -> Result<(), SettingsError> {
        for (section, db) in [("metrics", &self.metrics.database), ("meter", &self.meter.database)] {
            if db.is_empty() {
                return Err(SettingsError::InvalidConfig(format!(
                    "[{}] database must not be empty",
                    section
                )));
            }
            if !db.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(SettingsError::InvalidConfig(format!(
                    "[{}] database `{}` is not a plain identifier",
                    section, db
                )));
            }
        }
        Ok(())
    }
}

/// Replace `${VAR}` and `$VAR` references with environment values.
/// A `$` not followed by a name is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in ENV_REF.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let value = env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}
