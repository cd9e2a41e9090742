//! Configuration file management for checkwebcert.
//!
//! Settings come from three places, merged in this order of precedence:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (given with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! target = "example.com:8443"
//! output = "json"
//! verbose = false
//!
//! [prometheus]
//! enabled = true
//! port = 2112
//! interval = 10
//! failure_value = -1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Port the exporter listens on by default.
pub const DEFAULT_METRICS_PORT: u16 = 2112;

/// Seconds between two probes in exporter mode.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// How a one-shot result is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

/// Main configuration structure.
///
/// All fields are optional so partial configurations can be merged.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Endpoint to probe: host, host:port or a URL
    pub target: Option<String>,
    /// Output format: text, json, table
    pub output: Option<String>,
    /// Emit debug-level narration
    pub verbose: Option<bool>,
    /// Prometheus exporter configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus exporter configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    /// Run as an exporter instead of a one-shot check
    pub enabled: Option<bool>,
    /// Port serving /metrics
    pub port: Option<u16>,
    /// Seconds between probes
    pub interval: Option<u64>,
    /// Value written to the days gauge when a probe fails; unset keeps the last value
    pub failure_value: Option<i64>,
}

/// Fully resolved settings, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub target: String,
    pub output: OutputFormat,
    pub verbose: bool,
    pub exporter: Option<ExporterSettings>,
}

/// Resolved exporter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterSettings {
    pub port: u16,
    pub interval: Duration,
    pub failure_value: Option<i64>,
}

impl Default for Config {
    /// Defaults: text output, quiet, exporter disabled on port 2112 polling
    /// every 10 seconds, days gauge kept on failure.
    fn default() -> Self {
        Config {
            target: None,
            output: Some(OutputFormat::Text.to_string()),
            verbose: Some(false),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                port: Some(DEFAULT_METRICS_PORT),
                interval: Some(DEFAULT_INTERVAL_SECS),
                failure_value: None,
            }),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use checkwebcert::config::Config;
    /// let config = Config::from_file("checkwebcert.toml")?;
    /// # Ok::<(), checkwebcert::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// A `Some` in `other` overrides the current value, a `None` keeps it.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use checkwebcert::config::Config;
    /// let defaults = Config::default();
    /// let file_config = Config::from_file("checkwebcert.toml").unwrap_or_default();
    /// let merged = defaults.merge_with(file_config);
    /// ```
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.target.is_some() {
            self.target = other.target;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.port.is_some() {
                    self_prom.port = other_prom.port;
                }
                if other_prom.interval.is_some() {
                    self_prom.interval = other_prom.interval;
                }
                if other_prom.failure_value.is_some() {
                    self_prom.failure_value = other_prom.failure_value;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Creates a Config from command-line arguments for merging.
    ///
    /// Only the arguments that were given (`Some`) override other sources.
    /// Boolean switches are passed as `None` when absent from the command
    /// line, so a file can still turn them on.
    pub fn from_cli_args(
        target: Option<String>,
        output: Option<String>,
        verbose: Option<bool>,
        prometheus: Option<bool>,
        port: Option<u16>,
        interval: Option<u64>,
        failure_value: Option<i64>,
    ) -> Self {
        Config {
            target,
            output,
            verbose,
            prometheus: Some(PrometheusConfig {
                enabled: prometheus,
                port,
                interval,
                failure_value,
            }),
        }
    }

    /// Checks the merged configuration and turns it into [`Settings`].
    ///
    /// # Errors
    ///
    /// `ConfigError::Validation` when no target is set, the target is empty,
    /// the output format is unknown or the polling interval is zero.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let target = self
            .target
            .filter(|target| !target.trim().is_empty())
            .ok_or_else(|| ConfigError::Validation("a target host is required".to_string()))?;

        let output = match self.output {
            Some(output) => OutputFormat::from_str(&output).map_err(|_| {
                ConfigError::Validation(format!(
                    "unknown output format '{}', expected text, json or table",
                    output
                ))
            })?,
            None => OutputFormat::Text,
        };

        let exporter = match self.prometheus {
            Some(prometheus) if prometheus.enabled.unwrap_or(false) => {
                let interval = prometheus.interval.unwrap_or(DEFAULT_INTERVAL_SECS);
                if interval == 0 {
                    return Err(ConfigError::Validation(
                        "prometheus interval must be at least one second".to_string(),
                    ));
                }
                Some(ExporterSettings {
                    port: prometheus.port.unwrap_or(DEFAULT_METRICS_PORT),
                    interval: Duration::from_secs(interval),
                    failure_value: prometheus.failure_value,
                })
            }
            _ => None,
        };

        Ok(Settings {
            target,
            output,
            verbose: self.verbose.unwrap_or(false),
            exporter,
        })
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// # Example
    ///
    /// ```
    /// # use checkwebcert::config::Config;
    /// let example = Config::example_toml();
    /// assert!(example.contains("[prometheus]"));
    /// ```
    pub fn example_toml() -> String {
        let example = Config {
            target: Some("example.com:443".to_string()),
            output: Some(OutputFormat::Text.to_string()),
            verbose: Some(false),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                port: Some(DEFAULT_METRICS_PORT),
                interval: Some(DEFAULT_INTERVAL_SECS),
                failure_value: Some(-1),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
