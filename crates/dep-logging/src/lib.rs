//! Structured JSONL logging for the dep2p core runtime.
//!
//! # Quick start
//!
//! ```ignore
//! use dep_logging::{DepSubscriberBuilder, LogConfig};
//!
//! DepSubscriberBuilder::new().init();
//!
//! DepSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! Use [`NodeContextGuard`] to attach a node's short id to every event
//! emitted on the current thread for the guard's lifetime:
//!
//! ```ignore
//! use dep_logging::context::NodeContextGuard;
//!
//! let _guard = NodeContextGuard::new(&node_id);
//! tracing::info!("listening");
//! ```

pub mod config;
pub mod context;
pub mod correlation;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use correlation::{fields, spans, CorrelationContext, CorrelationExt};
pub use tracing_appender::rolling::Rotation;

use std::fs::{self, File};

use tracing_appender::rolling::{RollingFileAppender, Rotation as AppenderRotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Builder for configuring and initializing the global tracing subscriber.
pub struct DepSubscriberBuilder {
    config: LogConfig,
}

impl DepSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    fn make_file_writer(
        file_config: &FileConfig,
    ) -> (
        tracing_appender::non_blocking::NonBlocking,
        tracing_appender::non_blocking::WorkerGuard,
    ) {
        match file_config.rotation {
            RotationStrategy::Never => {
                fs::create_dir_all(&file_config.directory).ok();
                let file_path = file_config
                    .directory
                    .join(format!("{}.log", file_config.prefix));
                let file = File::create(&file_path).expect("failed to create log file");
                tracing_appender::non_blocking(file)
            }
            RotationStrategy::Daily => {
                let appender = RollingFileAppender::new(
                    AppenderRotation::DAILY,
                    &file_config.directory,
                    &file_config.prefix,
                );
                tracing_appender::non_blocking(appender)
            }
            RotationStrategy::Hourly => {
                let appender = RollingFileAppender::new(
                    AppenderRotation::HOURLY,
                    &file_config.directory,
                    &file_config.prefix,
                );
                tracing_appender::non_blocking(appender)
            }
        }
    }

    /// Initialize the subscriber globally. Returns a guard that must be
    /// kept alive for the duration of the program if file output is used.
    ///
    /// # Panics
    ///
    /// Panics if a global subscriber has already been set.
    pub fn init(self) -> Option<tracing_appender::non_blocking::WorkerGuard> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let registry = Registry::default()
            .with(env_filter)
            .with(layers::NodeContextLayer::new());

        match (
            self.config.console.enabled,
            self.config.console.pretty,
            self.config.file.is_some(),
        ) {
            (true, true, true) => {
                let file_config = self.config.file.as_ref().unwrap();
                let (non_blocking, guard) = Self::make_file_writer(file_config);

                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true);
                let file_layer = Self::jsonl_layer(&self.config.jsonl).with_writer(non_blocking);

                registry.with(console_layer).with(file_layer).init();
                Some(guard)
            }
            (true, false, true) => {
                let file_config = self.config.file.as_ref().unwrap();
                let (non_blocking, guard) = Self::make_file_writer(file_config);

                let console_layer = Self::jsonl_layer(&self.config.jsonl);
                let file_layer = Self::jsonl_layer(&self.config.jsonl).with_writer(non_blocking);

                registry.with(console_layer).with(file_layer).init();
                Some(guard)
            }
            (true, true, false) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true);
                registry.with(console_layer).init();
                None
            }
            (true, false, false) => {
                let console_layer = Self::jsonl_layer(&self.config.jsonl);
                registry.with(console_layer).init();
                None
            }
            (false, _, true) => {
                let file_config = self.config.file.as_ref().unwrap();
                let (non_blocking, guard) = Self::make_file_writer(file_config);
                let file_layer = Self::jsonl_layer(&self.config.jsonl).with_writer(non_blocking);
                registry.with(file_layer).init();
                Some(guard)
            }
            (false, _, false) => {
                registry.init();
                None
            }
        }
    }

    fn jsonl_layer(
        jsonl: &JsonlConfig,
    ) -> tracing_subscriber::fmt::Layer<
        Registry,
        tracing_subscriber::fmt::format::JsonFields,
        tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
    > {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
    }

    pub fn try_init(
        self,
    ) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, &'static str> {
        Ok(self.init())
    }
}

impl Default for DepSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging with default settings (JSONL to console).
pub fn init_default() {
    DepSubscriberBuilder::new().init();
}

/// Initialize logging for development (verbose, pretty console output).
pub fn init_development() {
    DepSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init();
}

/// Initialize logging for test runs (minimal, safe to call more than once).
pub fn init_testing() {
    let _ = DepSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_level_is_info() {
        let builder = DepSubscriberBuilder::new();
        assert_eq!(builder.config.default_level, "info");
    }

    #[test]
    fn builder_default_is_jsonl() {
        let builder = DepSubscriberBuilder::new();
        assert!(!builder.config.console.pretty);
    }

    #[test]
    fn builder_with_config_applies_it() {
        let builder = DepSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config.default_level, "debug");
        assert!(builder.config.console.pretty);
    }

    #[test]
    fn builder_with_level_overrides_config_level() {
        let builder = DepSubscriberBuilder::new().with_level("trace");
        assert_eq!(builder.config.default_level, "trace");
    }

    #[test]
    fn builder_with_console_toggles_it() {
        let builder = DepSubscriberBuilder::new().with_console(false);
        assert!(!builder.config.console.enabled);
    }
}
