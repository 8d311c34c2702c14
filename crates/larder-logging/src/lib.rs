//! Structured logging for Larder
//!
//! Every Larder crate logs through `tracing` with structured fields
//! (`collection`, `id`, `group`, ...). This crate installs the global
//! subscriber that turns those events into output:
//!
//! - console as JSON lines (default), plain text or colored text
//! - optional rolling JSON-lines files via `tracing-appender`
//! - `RUST_LOG` replaces the configured base level
//!
//! ```ignore
//! use larder_logging::{LarderSubscriberBuilder, LogConfig};
//!
//! let _guard = LarderSubscriberBuilder::new()
//!     .with_config(LogConfig::server("/var/log/larder"))
//!     .with_target("larder_relay=debug")
//!     .init();
//! ```

pub mod config;

pub use config::{ConsoleFormat, FileRotation, FileSink, JsonShape, LogConfig};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to open log file: {0}")]
    File(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Installs the global `tracing` subscriber from a [`LogConfig`].
#[derive(Debug, Clone, Default)]
pub struct LarderSubscriberBuilder {
    config: LogConfig,
}

impl LarderSubscriberBuilder {
    /// JSON lines to the console at `info`
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the base level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Add a per-target filter such as `larder_relay=debug`
    pub fn with_target(mut self, directive: impl Into<String>) -> Self {
        self.config.targets.push(directive.into());
        self
    }

    /// Choose the console format, or [`ConsoleFormat::Off`]
    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Also write JSON lines to files
    pub fn with_file(mut self, sink: FileSink) -> Self {
        self.config.file = Some(sink);
        self
    }

    /// The configuration `try_init` will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally.
    ///
    /// With a file sink the returned guard flushes the background writer
    /// when dropped; hold it until shutdown.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = self.filter()?;
        let (layers, guard) = self.layers()?;
        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))?;
        Ok(guard)
    }

    /// Install the subscriber globally.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber is already set or the configuration
    /// is invalid.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => panic!("{e}"),
        }
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        let base = match EnvFilter::try_from_default_env() {
            Ok(from_env) => from_env,
            Err(_) => EnvFilter::try_new(&self.config.level)
                .map_err(|e| LoggingError::Filter(format!("{}: {e}", self.config.level)))?,
        };
        self.config
            .targets
            .iter()
            .try_fold(base, |filter, target| -> Result<EnvFilter, LoggingError> {
                let directive = target
                    .parse()
                    .map_err(|e| LoggingError::Filter(format!("{target}: {e}")))?;
                Ok(filter.add_directive(directive))
            })
    }

    fn layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
        let shape = &self.config.json;
        let mut layers: Vec<BoxedLayer> = Vec::new();

        match self.config.console {
            ConsoleFormat::Off => {}
            ConsoleFormat::Json => layers.push(json_layer(shape, std::io::stdout)),
            ConsoleFormat::Pretty | ConsoleFormat::Color => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console == ConsoleFormat::Color)
                    .with_target(true)
                    .boxed(),
            ),
        }

        let mut guard = None;
        if let Some(sink) = &self.config.file {
            let (writer, flush_guard) = open_sink(sink)?;
            layers.push(json_layer(shape, writer));
            guard = Some(flush_guard);
        }

        Ok((layers, guard))
    }
}

fn json_layer<W>(shape: &JsonShape, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(shape.flatten)
        .with_current_span(shape.spans)
        .with_span_list(shape.spans)
        .with_file(shape.location)
        .with_line_number(shape.location)
        .with_writer(writer)
        .boxed()
}

fn open_sink(sink: &FileSink) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match sink.rotation {
        FileRotation::Daily => Rotation::DAILY,
        FileRotation::Hourly => Rotation::HOURLY,
        FileRotation::Never => {
            fs::create_dir_all(&sink.dir).map_err(|e| LoggingError::File(e.to_string()))?;
            let path = sink.dir.join(format!("{}.log", sink.prefix));
            let file = fs::File::create(&path)
                .map_err(|e| LoggingError::File(format!("{}: {e}", path.display())))?;
            return Ok(tracing_appender::non_blocking(file));
        }
    };

    let mut appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(sink.prefix.as_str())
        .filename_suffix("log");
    if let Some(keep) = sink.keep {
        appender = appender.max_log_files(keep);
    }
    let appender = appender
        .build(&sink.dir)
        .map_err(|e| LoggingError::File(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}
