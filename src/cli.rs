//! Command-line parsing.
//!
//! The daemon takes a handful of flags, so they are parsed by hand:
//!
//! ```text
//! hive-telemetry [-f|--config <path>] [-d|--log-level <level>]
//! hive-telemetry -h|--help
//! hive-telemetry -V|-v|--version
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::config::logger::validate_log_level;

/// Errors produced while parsing the command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Options for a normal run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Args {
    /// Configuration file given with `-f`.
    pub config: Option<PathBuf>,
    /// Level given with `-d`; overrides every logging category.
    pub log_level: Option<String>,
}

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(Args),
    Help,
    Version,
}

impl Command {
    /// Parses the arguments following the program name.
    ///
    /// `--help` and `--version` win as soon as they are seen.
    pub fn parse<I, S>(args: I) -> Result<Command, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Args::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Command::Help),
                "-V" | "-v" | "--version" => return Ok(Command::Version),
                "-f" | "--config" => {
                    let value = args.next().ok_or(CliError::MissingValue(arg))?;
                    parsed.config = Some(PathBuf::from(value));
                }
                "-d" | "--log-level" => {
                    let value = args.next().ok_or(CliError::MissingValue(arg))?;
                    validate_log_level(&value)
                        .map_err(|_| CliError::InvalidLogLevel(value.clone()))?;
                    parsed.log_level = Some(value.to_lowercase());
                }
                _ => return Err(CliError::UnknownArgument(arg)),
            }
        }

        Ok(Command::Run(parsed))
    }
}

/// Text printed for `--help`.
pub fn usage() -> String {
    format!(
        "{name} {version}
Reads sysfs sensors and publishes one payload per reading.

Usage: {name} [OPTIONS]

Options:
  -f, --config <PATH>      Configuration file (default: ${env}, then {system}, then ./{local})
  -d, --log-level <LEVEL>  Log level for every category: trace, debug, info, warn, error
  -h, --help               Print this help and exit
  -V, --version            Print version and exit",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        env = crate::config::CONFIG_ENV,
        system = crate::config::SYSTEM_CONFIG_PATH,
        local = crate::config::LOCAL_CONFIG_PATH,
    )
}

/// Text printed for `--version`.
pub fn version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_runs_with_defaults() {
        assert_eq!(
            Command::parse(Vec::<String>::new()),
            Ok(Command::Run(Args::default()))
        );
    }

    #[test]
    fn test_config_and_level() {
        let cmd = Command::parse(["-f", "/etc/hive.toml", "--log-level", "DEBUG"]).unwrap();
        assert_eq!(
            cmd,
            Command::Run(Args {
                config: Some(PathBuf::from("/etc/hive.toml")),
                log_level: Some("debug".into()),
            })
        );
    }

    #[test]
    fn test_help_and_version_short_circuit() {
        assert_eq!(Command::parse(["-f", "x", "--help"]), Ok(Command::Help));
        assert_eq!(Command::parse(["-v"]), Ok(Command::Version));
        assert_eq!(Command::parse(["--version", "--bogus"]), Ok(Command::Version));
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(
            Command::parse(["--bogus"]),
            Err(CliError::UnknownArgument("--bogus".into()))
        );
        assert_eq!(
            Command::parse(["-f"]),
            Err(CliError::MissingValue("-f".into()))
        );
        assert_eq!(
            Command::parse(["-d", "chatty"]),
            Err(CliError::InvalidLogLevel("chatty".into()))
        );
    }

    #[test]
    fn test_version_string() {
        assert!(version().starts_with("hive-telemetry "));
        assert!(usage().contains("--config"));
    }
}
