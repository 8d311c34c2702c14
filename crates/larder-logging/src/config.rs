//! Log output settings
//!
//! Deserializes from the `[log]` table of a Larder config file. Every field
//! is optional there.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how log events are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter level; `RUST_LOG` replaces it when set
    pub level: String,
    /// Per-target overrides such as `larder_storage=debug`
    pub targets: Vec<String>,
    /// Console sink
    pub console: ConsoleFormat,
    /// File sink, always JSON lines
    pub file: Option<FileSink>,
    /// Shape of JSON records
    pub json: JsonShape,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            targets: Vec::new(),
            console: ConsoleFormat::Json,
            file: None,
            json: JsonShape::default(),
        }
    }
}

impl LogConfig {
    /// Debug level with colored console lines
    pub fn development() -> Self {
        Self {
            level: "debug".into(),
            console: ConsoleFormat::Color,
            ..Self::default()
        }
    }

    /// Relay server deployment: JSON to stdout plus daily files under `dir`
    /// kept for two weeks
    pub fn server(dir: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(FileSink {
                keep: Some(14),
                ..FileSink::new(dir, "larder-relay")
            }),
            ..Self::default()
        }
    }

    /// Warnings only, uncolored; for test binaries
    pub fn quiet() -> Self {
        Self {
            level: "warn".into(),
            console: ConsoleFormat::Pretty,
            ..Self::default()
        }
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// No console output
    Off,
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines
    Pretty,
    /// Human-readable lines with ANSI colors
    Color,
}

/// Rolling JSON-lines file output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSink {
    pub dir: PathBuf,
    /// File name prefix; files are named `<prefix>.<date>.log`
    pub prefix: String,
    pub rotation: FileRotation,
    /// Rotated files to retain; all of them when unset
    pub keep: Option<usize>,
}

impl FileSink {
    /// Daily files named `prefix` under `dir`, keeping a week
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            rotation: FileRotation::Daily,
            keep: Some(7),
        }
    }

    /// Change the rotation period
    pub fn rotate(mut self, rotation: FileRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new("logs", "larder")
    }
}

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    /// A single `<prefix>.log`, truncated at startup
    Never,
}

/// Which extras a JSON record carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonShape {
    /// Put event fields at the top level instead of under `fields`
    pub flatten: bool,
    /// Attach the current span and the span stack
    pub spans: bool,
    /// Attach source file and line
    pub location: bool,
}

impl Default for JsonShape {
    fn default() -> Self {
        Self {
            flatten: true,
            spans: true,
            location: false,
        }
    }
}
