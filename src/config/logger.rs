//! Logging configuration structures and validation logic.
//!
//! Besides the global level, three categories can be tuned separately:
//! `main` (the daemon itself), `sensors` (acquisition and formatting) and
//! `network` (the MQTT client). Each maps onto a `tracing` filter directive.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Filter target of the `main` category.
pub const MAIN_TARGET: &str = "hive_telemetry";
/// Filter target of the `sensors` category.
pub const SENSORS_TARGET: &str = "hive_telemetry::core";
/// Filter target of the `network` category.
pub const NETWORK_TARGET: &str = "hive_telemetry_mqtt";

/// Available formats for console log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "pretty")]
    Pretty,
    #[serde(rename = "json")]
    Json,
}

/// Top-level logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level. Valid values: trace, debug, info, warn, error (case-insensitive).
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// Per-category overrides of the global level.
    #[validate(nested)]
    pub categories: CategoryLevels,

    /// Optional console output configuration.
    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    /// Optional systemd journald output configuration.
    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            categories: CategoryLevels::default(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
        }
    }
}

impl LoggerConfig {
    /// Forces every category to `level`, dropping file-level overrides.
    pub fn override_level(&mut self, level: impl Into<String>) {
        self.level = level.into();
        self.categories = CategoryLevels::default();
    }

    /// `EnvFilter` directives for the global level and category overrides.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.to_lowercase()];
        let overrides = [
            (MAIN_TARGET, &self.categories.main),
            (SENSORS_TARGET, &self.categories.sensors),
            (NETWORK_TARGET, &self.categories.network),
        ];
        for (target, level) in overrides {
            if let Some(level) = level {
                directives.push(format!("{}={}", target, level.to_lowercase()));
            }
        }
        directives.join(",")
    }
}

/// Optional levels for the `main`, `sensors` and `network` categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_category_levels"))]
pub struct CategoryLevels {
    pub main: Option<String>,
    pub sensors: Option<String>,
    pub network: Option<String>,
}

fn validate_category_levels(levels: &CategoryLevels) -> Result<(), ValidationError> {
    [&levels.main, &levels.sensors, &levels.network]
        .into_iter()
        .flatten()
        .try_for_each(|level| validate_log_level(level))
}

/// Validates that the provided log level is one of the supported values.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

/// Configuration for console log output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Whether console output is enabled.
    pub enabled: bool,

    /// Output format for console logs.
    pub format: LogFormat,

    /// Include the log target (module path) in output.
    pub show_target: bool,

    /// Include thread IDs in output.
    pub show_thread_ids: bool,

    /// Enable ANSI color codes in console output.
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: true,
            show_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Configuration for systemd journald output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    /// Whether journald output is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Identifier used for journal entries. Must be non-empty.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "hive-telemetry".to_string(),
        }
    }
}
