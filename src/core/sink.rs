//! Hand-off point between the acquisition loop and the publishing side.

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{error::SinkError, formatter::FormattedPayload, sensor::SensorDescriptor};

/// A formatted reading together with the identity it was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub module: String,
    pub sensor: String,
    pub payload: FormattedPayload,
}

impl Outbound {
    pub fn new(sensor: &SensorDescriptor, payload: FormattedPayload) -> Self {
        Self {
            module: sensor.module().to_string(),
            sensor: sensor.name().to_string(),
            payload,
        }
    }

    /// Topic suffix relative to the publisher's base topic.
    pub fn topic(&self) -> String {
        format!("{}/{}", self.module, self.sensor)
    }
}

/// Receives payloads from the acquisition loop, in production order.
pub trait PayloadSink {
    fn deliver(&mut self, outbound: Outbound) -> Result<(), SinkError>;
}

impl PayloadSink for Vec<Outbound> {
    fn deliver(&mut self, outbound: Outbound) -> Result<(), SinkError> {
        self.push(outbound);
        Ok(())
    }
}

/// Forwards payloads into a bounded tokio channel.
///
/// Delivery never blocks. When the publisher falls behind and the channel is
/// full the payload is rejected with `SinkError::Full`.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }
}

impl PayloadSink for ChannelSink {
    fn deliver(&mut self, outbound: Outbound) -> Result<(), SinkError> {
        self.tx.try_send(outbound).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Creates a connected sink and receiver pair.
pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink::new(tx), rx)
}
