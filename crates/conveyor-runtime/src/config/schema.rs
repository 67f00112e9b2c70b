//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConveyorConfig {
    /// Logging output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bus endpoint settings.
    #[serde(default)]
    pub bus: BusConfig,
}

// =============================================================================
// Bus
// =============================================================================

/// Bus endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    /// Broker connection address. `memory://` selects the in-process transport.
    #[serde(default = "default_address")]
    pub address: String,

    /// Name of the queue this endpoint receives from.
    #[serde(default = "default_input_queue")]
    pub input_queue: String,

    /// Number of concurrent receive loops.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of messages processed at the same time.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Log the assembled step pipeline at startup.
    #[serde(default = "default_log_pipeline")]
    pub log_pipeline: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            input_queue: default_input_queue(),
            workers: default_workers(),
            max_parallelism: default_max_parallelism(),
            log_pipeline: default_log_pipeline(),
        }
    }
}

/// Address of the in-process transport.
pub const MEMORY_ADDRESS: &str = "memory://";

fn default_address() -> String {
    MEMORY_ADDRESS.to_string()
}

fn default_input_queue() -> String {
    "conveyor".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_max_parallelism() -> usize {
    30
}

fn default_log_pipeline() -> bool {
    true
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
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
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

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

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// One JSON object per line.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle transitions are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
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
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Base log level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `conveyor_framework = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}
