//! Construction of the `rumqttc` client and event loop.

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use tracing::debug;

use super::{config::Config, error::TransferError};

/// Accumulates `MqttOptions` and builds the client pair.
///
/// The returned `AsyncClient` is cheap to clone. The `EventLoop` must be
/// polled by exactly one task (see `ConnectionKernel`).
pub struct ClientBuilder {
    opts: MqttOptions,
    cap: usize,
}

impl ClientBuilder {
    pub fn new(
        client_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cap: usize,
    ) -> Self {
        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap,
        }
    }

    /// Creates a builder from the `[transport]` section.
    ///
    /// An empty client id is replaced by a random UUID.
    ///
    /// # Errors
    ///
    /// `ClientSetup` if keep-alive or channel capacity would make `rumqttc`
    /// panic.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        if config.keep_alive < 5 {
            return Err(TransferError::ClientSetup(format!(
                "Keep alive of {}s is below the 5s minimum",
                config.keep_alive
            )));
        }
        if config.request_channel_capacity == 0 {
            return Err(TransferError::ClientSetup(
                "Request channel capacity must be at least 1".into(),
            ));
        }

        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };
        debug!(
            "MQTT client '{}' for {}:{}",
            client_id, config.host, config.port
        );

        let builder = Self::new(
            client_id,
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )
        .keep_alive(Duration::from_secs(config.keep_alive))
        .clean_session(config.clean_session);

        Ok(builder)
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.opts.set_keep_alive(keep_alive);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    pub fn client_id(&self) -> String {
        self.opts.client_id()
    }

    /// Builds the client and its event loop. No network I/O happens here.
    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}
