//! Application configuration loading, validation, and management.
//!
//! This module provides the top-level `Config` structure that aggregates
//! sensor, logging and transport configuration. It is loaded once at startup
//! from a TOML file, validated as a whole, and then passed by reference to
//! the components that need it. Nothing mutates it afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{logger::LoggerConfig, sensors::SensorsConfig};

pub mod logger;
pub mod sensors;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HIVE_TELEMETRY_CONFIG";

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/hive-telemetry/telemetry.toml";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_PATH: &str = "telemetry.toml";

/// Simple macros for printing timestamped messages before the tracing subscriber
/// is initialized. These are used during early configuration loading.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::config::print_line("INFO", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::config::print_line("WARN", format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::config::print_line("ERROR", format_args!($($arg)*))
    };
}

#[doc(hidden)]
pub fn print_line(level: &'static str, args: std::fmt::Arguments<'_>) {
    let level = match level {
        "ERROR" => console::style(level).red(),
        "WARN" => console::style(level).yellow(),
        _ => console::style(level).green(),
    };
    let stamp = time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .unwrap_or_default();
    println!("{}  {} {}", console::style(stamp).dim(), level, args);
}

/// Errors that can occur during configuration loading, parsing or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Sensors to poll and the shared poll interval.
    #[validate(nested)]
    pub sensors: SensorsConfig,

    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// MQTT transport configuration, validated separately in [`Config::parse`].
    #[cfg(feature = "mqtt")]
    pub transport: TransportConfig,
}

#[cfg(feature = "mqtt")]
pub type TransportConfig = hive_telemetry_mqtt::Config;

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// `explicit` (typically from the command line) wins over everything else.
    /// When no file is found at all the built-in defaults are used.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the selected configuration file cannot be
    /// read, parsed, or validated.
    pub fn new(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_path(Self::resolve_path(explicit, env, |p| p.exists()).as_deref())
    }

    /// Loads `path`, or falls back to the defaults when there is none.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Config::load`] and from validating the defaults.
    pub fn from_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                print_warn!("No configuration file found, using built-in defaults");
                Self::validated(Config::default())
            }
        }
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. explicit path
    /// 2. `HIVE_TELEMETRY_CONFIG` environment variable
    /// 3. `/etc/hive-telemetry/telemetry.toml`
    /// 4. `./telemetry.toml`
    ///
    /// Returns `None` if none of the default locations exists.
    pub fn resolve_path(
        explicit: Option<&Path>,
        env: Option<PathBuf>,
        exists: impl Fn(&Path) -> bool,
    ) -> Option<PathBuf> {
        if let Some(path) = explicit {
            print_info!("Using config from command line: {}", path.display());
            return Some(path.to_path_buf());
        }

        if let Some(path) = env {
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Some(path);
        }

        [SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH]
            .into_iter()
            .map(Path::new)
            .find(|fallback| exists(fallback))
            .map(|fallback| {
                print_info!("Using default config path: {}", fallback.display());
                fallback.to_path_buf()
            })
    }

    /// Loads and validates configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::parse(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` for malformed TOML and `ValidationError` when any
    /// section fails validation.
    pub fn parse(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validated(config)
    }

    fn validated(config: Config) -> Result<Config, ConfigError> {
        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        #[cfg(feature = "mqtt")]
        config
            .transport
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }
}
