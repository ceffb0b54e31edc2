//! Structured logging for Annulus nodes
//!
//! Sets up a `tracing` subscriber that writes JSON lines (or pretty text
//! during development) to the console and optionally to rotated files,
//! with the emitting node attached to every span.
//!
//! # Quick Start
//!
//! ```ignore
//! use annulus_logging::{AnnulusSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! let _guard = AnnulusSubscriberBuilder::new().init();
//!
//! // Pretty console output
//! let _guard = AnnulusSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! # Node Context
//!
//! ```ignore
//! use annulus_logging::NodeContextGuard;
//!
//! let _node = NodeContextGuard::new(local_address);
//! let span = NodeContextGuard::current().unwrap().span();
//! let _entered = span.enter();
//! tracing::info!("Routing packet"); // carries node and instance_id
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleFormat, ConsoleSink, FileRotation, FileSink, JsonFields, LogConfig};
pub use context::{NodeContextData, NodeContextGuard};
pub use error::{LoggingError, LoggingResult};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Builder for configuring and installing the global subscriber
///
/// Console output is JSONL unless the config asks for pretty output.
pub struct AnnulusSubscriberBuilder {
    config: LogConfig,
}

impl AnnulusSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config = self.config.with_target(target, level);
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Also write JSON lines to files
    pub fn with_file_output(mut self, sink: FileSink) -> Self {
        self.config.file = Some(sink);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the level filter; `RUST_LOG` wins over the config when set
    pub fn env_filter(&self) -> LoggingResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let mut directives = self.config.directives().into_iter();
        let mut filter = EnvFilter::new(directives.next().unwrap_or_default());
        for directive in directives {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes the file writer when dropped, so keep
    /// it alive for the life of the program. Fails if a global
    /// subscriber is already set.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let env_filter = self.env_filter()?;
        let json = &self.config.json;
        let console = &self.config.console;

        let (file_sink, guard) = match &self.config.file {
            Some(file) => {
                let (writer, guard) = file_writer(file)?;
                (Some(writer), Some(guard))
            }
            None => (None, None),
        };

        let pretty_console = console.is_pretty().then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });

        let json_console = console.is_json().then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(json.span_list)
                .flatten_event(json.flatten)
                .with_file(json.source_location)
                .with_line_number(json.source_location)
                .with_thread_ids(json.thread)
                .with_thread_names(json.thread)
        });

        let json_file = file_sink.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(json.span_list)
                .flatten_event(json.flatten)
                .with_file(json.source_location)
                .with_line_number(json.source_location)
                .with_thread_ids(json.thread)
                .with_thread_names(json.thread)
                .with_writer(writer)
        });

        Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new())
            .with(pretty_console)
            .with(json_console)
            .with(json_file)
            .try_init()?;

        Ok(guard)
    }

    /// Install the subscriber globally, reporting failures on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }
}

impl Default for AnnulusSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Single files are truncated on start; rotated files are appended to
fn file_writer(sink: &FileSink) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    let rotation = match sink.rotation {
        FileRotation::Never => {
            fs::create_dir_all(&sink.directory)?;
            let path = sink.directory.join(format!("{}.log", sink.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        FileRotation::Daily => Rotation::DAILY,
        FileRotation::Hourly => Rotation::HOURLY,
    };
    let appender = RollingFileAppender::new(rotation, &sink.directory, &sink.prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    AnnulusSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    AnnulusSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests; safe to call from every test
pub fn init_testing() {
    let _ = AnnulusSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
