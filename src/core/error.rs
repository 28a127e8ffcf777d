use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning configuration into sensor descriptors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SensorError {
    /// The bus family is not one of `w1` or `i2c`.
    #[error("{0} is not supported")]
    UnsupportedInputType(String),

    /// The per-sensor configuration lists do not line up.
    #[error("Configuration lists are not the same size: {names} names, {types} types, {serials} serials, {input_types} input types")]
    ListLengthMismatch {
        names: usize,
        types: usize,
        serials: usize,
        input_types: usize,
    },

    /// No sensor is configured at all.
    #[error("No sensors configured")]
    Empty,

    /// Two sensors share a name.
    #[error("Sensor name '{0}' is configured more than once")]
    DuplicateName(String),
}

/// Hard failures of the acquisition loop.
///
/// Every variant terminates the daemon. Per-sensor open and read failures are
/// soft and never surface here.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// The kernel reported a hangup on a monitored device handle.
    #[error("Hangup on sensor '{sensor}' ({path})")]
    Hangup { sensor: String, path: PathBuf },

    /// The kernel reported an I/O error condition on a monitored device handle.
    #[error("Poll error on sensor '{sensor}' ({path})")]
    PollError { sensor: String, path: PathBuf },

    /// The multiplexed wait itself failed.
    #[error("Multiplexed wait failed")]
    Wait(#[source] std::io::Error),
}

/// Failure to hand a payload to the publishing side.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The receiving end has gone away.
    #[error("Payload channel closed")]
    Closed,

    /// The publishing side is not keeping up and the payload was dropped.
    #[error("Payload channel full")]
    Full,
}
