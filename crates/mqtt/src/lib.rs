//! MQTT transport for hive-telemetry.
//!
//! Payloads are plain text lines; this crate only moves them to a broker:
//!
//! * `config`: `[transport]` section, validated with `validator`.
//! * `client`: builds the `rumqttc` client and event loop from `Config`.
//! * `connection`: `ConnectionKernel`, which drives the event loop and
//!   reconnects with exponential backoff.
//! * `manager`: starts the kernel and hands out an `MqttInstance`.
//! * `publisher`: publishes text under the configured base topic.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod publisher;
pub mod state;

pub use backoff::{Backoff, BackoffError};
pub use config::Config;
pub use error::TransferError;
pub use manager::{MqttInstance, MqttManager};
pub use publisher::Publisher;
pub use state::ConnectionState;
