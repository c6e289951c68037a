//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use conduit_framework::LifecycleOptions;

use super::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConduitConfig {
    /// Logging subscriber settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plugin lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Middleware pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Per-plugin configuration, keyed by plugin name.
    ///
    /// Each value is handed unchanged to the plugin through its context.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// All accepted level names.
    pub const NAMES: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Returns the level name as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the equivalent `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(ConfigError::validation(format!(
                "Invalid log level: {other}. Valid values are: {:?}",
                Self::NAMES
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON; requires the `json-log` feature.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Append to `logging.file_path`.
    File,
    /// Install a subscriber that records nothing.
    Silent,
}

/// How often a file log is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Per-module level overrides, e.g. `conduit_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,

    /// Log file, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Rollover schedule for file output.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Number of rolled files to keep; `0` keeps all of them.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Span events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            filters: HashMap::new(),
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Lifecycle and pipeline
// =============================================================================

/// Plugin lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Deadline for each lifecycle hook in milliseconds; `0` disables it.
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: Option<u64>,

    /// Run hooks of independent plugins concurrently within a pass.
    #[serde(default = "default_parallel_passes")]
    pub parallel_passes: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            hook_timeout_ms: default_hook_timeout_ms(),
            parallel_passes: default_parallel_passes(),
        }
    }
}

impl LifecycleConfig {
    /// Converts to the controller's options.
    pub fn to_options(&self) -> LifecycleOptions {
        LifecycleOptions {
            hook_timeout: deadline(self.hook_timeout_ms),
            parallel_passes: self.parallel_passes,
        }
    }
}

fn default_hook_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_parallel_passes() -> bool {
    true
}

/// Middleware pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for each middleware phase call in milliseconds; `0` or
    /// absent disables it.
    #[serde(default)]
    pub middleware_timeout_ms: Option<u64>,
}

impl PipelineConfig {
    /// Returns the per-call deadline, if any.
    pub fn call_timeout(&self) -> Option<Duration> {
        deadline(self.middleware_timeout_ms)
    }
}

/// Maps a millisecond setting to a deadline; `0` means none.
fn deadline(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}
