//! hive-telemetry: sysfs sensor poller and telemetry publisher
//!
//! The daemon periodically reads one-wire and I2C sensors exposed under
//! `/sys/bus/<bus>/devices/<address>/<measurement>`, turns every reading into
//! a single comma-separated payload line and hands it to a publisher.
//!
//! ## Modules
//!
//! * `config`: TOML configuration for sensors, logging and the MQTT transport.
//!   Validated with the `validator` crate before anything starts.
//!
//! * `core`: runtime components
//!   - Sensor descriptors and device paths
//!   - Reading formatter
//!   - Readiness-multiplexed acquisition loop
//!   - Payload sink and publisher dispatch
//!
//! * `logger`: `tracing` subscriber setup (console and journald).
//!
//! * `cli`: Command-line flags.
//!
//! ## Features
//!
//! * `mqtt`: Publishes payloads through the `hive_telemetry_mqtt` crate
//!   (default: enabled). Without it payloads are only logged.

pub mod cli;
pub mod config;
pub mod core;
pub mod logger;
