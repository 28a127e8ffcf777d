//! Connection state published by the connection kernel.

use std::fmt;

/// Current state of the broker connection.
///
/// `Connecting` -> `Connected` -> `Disconnected` -> `Reconnecting` -> `Connecting` ...
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// CONNECT sent, waiting for CONNACK.
    Connecting,

    /// The broker acknowledged the connection.
    Connected,

    /// Connection lost or closed; carries the reason.
    Disconnected(String),

    /// Waiting the given number of seconds before the next attempt.
    Reconnecting(f64),
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
        }
    }

    /// Reason of a disconnect or delay of a reconnect, empty otherwise.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Connecting | ConnectionState::Connected => String::new(),
            ConnectionState::Disconnected(reason) => reason.clone(),
            ConnectionState::Reconnecting(seconds) => format!("in {seconds} seconds"),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}
