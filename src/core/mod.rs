//! Sensor acquisition core: descriptors, sample formatting, the polling loop
//! and the hand-off to publishers.

pub mod acquisition;
pub mod error;
pub mod formatter;
pub mod poll;
pub mod publisher;
pub mod sensor;
pub mod sink;
