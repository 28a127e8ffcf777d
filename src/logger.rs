//! Logging initialization.
//!
//! `LoggerManager` validates the `[logger]` section and installs the global
//! `tracing` subscriber: a console layer (compact, pretty or JSON) and an
//! optional systemd journald layer. Both share the same filter, built from the
//! global level and the per-category overrides. `RUST_LOG` wins over both.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// Validation errors from the logger configuration struct.
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// Filter directives built from the configuration did not parse.
    #[error("Invalid filter directives '{directives}': {source}")]
    FilterError {
        directives: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    /// IO error, typically while connecting to the journald socket.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// No output layers were configured.
    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// A global subscriber was already installed.
    #[error("Logger initialization error: {0}")]
    InitializationError(String),
}

/// Manages logging configuration and global subscriber initialization.
pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Creates a new `LoggerManager` and validates the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager { config })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Builds the filter shared by all layers.
    ///
    /// `RUST_LOG` is used when set and valid; otherwise the configured level
    /// and category overrides apply.
    pub fn filter(&self) -> Result<EnvFilter, LoggerError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let directives = self.config.filter_directives();
        EnvFilter::try_new(&directives)
            .map_err(|source| LoggerError::FilterError { directives, source })
    }

    /// Initializes the global `tracing` subscriber with configured layers.
    ///
    /// Must be called once, before the acquisition loop starts.
    ///
    /// # Errors
    ///
    /// Returns an error if no layer could be created or a subscriber is
    /// already installed.
    pub fn init(&self) -> Result<(), LoggerError> {
        let layers = self.layers()?;

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    fn layers(&self) -> Result<Vec<BoxedLayer>, LoggerError> {
        let mut layers = Vec::new();

        if let Some(console_config) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(Self::console_layer(console_config, self.filter()?));
        }

        // Journald layer (Linux/systemd only)
        if let Some(journald_config) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match tracing_journald::layer() {
                Ok(layer) => {
                    let layer = layer
                        .with_syslog_identifier(journald_config.identifier.clone())
                        .with_filter(self.filter()?)
                        .boxed();
                    layers.push(layer);
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        journald_config.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize systemd journald logger: {}", e);
                    if layers.is_empty() {
                        return Err(LoggerError::IoError(e));
                    }
                }
            }
        }

        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }

        Ok(layers)
    }

    fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
        let writer = io::stdout;
        match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        }
    }
}
