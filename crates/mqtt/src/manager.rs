//! Entry point of the transport.
//!
//! `MqttManager::start` builds the client, spawns the connection kernel and
//! returns an `MqttInstance`. The instance hands out publishers and stops the
//! kernel on shutdown.

use rumqttc::AsyncClient;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use validator::Validate;

use super::{
    backoff::Backoff, client::ClientBuilder, config::Config, connection::ConnectionKernel,
    error::TransferError, publisher::Publisher,
};

/// Validated transport configuration, ready to start.
pub struct MqttManager {
    config: Config,
    cancel_token: CancellationToken,
}

impl MqttManager {
    /// # Errors
    ///
    /// `ConfigError` if the configuration does not validate.
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Builds the client and spawns the connection kernel on the current
    /// tokio runtime. Connecting happens in the background.
    ///
    /// # Errors
    ///
    /// `ClientSetup` if the client cannot be built.
    pub fn start(self) -> Result<MqttInstance, TransferError> {
        info!(
            "Starting MQTT client for {}:{} with base_topic: '{}'",
            self.config.host, self.config.port, self.config.base_topic
        );

        let (client, event_loop) = ClientBuilder::from_config(&self.config)?.build();
        let mut kernel = ConnectionKernel::new(
            client.clone(),
            event_loop,
            Backoff::from_config(&self.config),
            self.cancel_token.clone(),
        );

        let kernel_task = tokio::spawn(async move {
            let result = kernel.run().await;
            if let Err(e) = &result {
                error!("MQTT connection kernel exited with error: {}", e);
            }
            result
        });

        Ok(MqttInstance {
            client,
            cancel_token: self.cancel_token,
            kernel_task,
            config: self.config,
        })
    }
}

/// A running transport.
pub struct MqttInstance {
    client: AsyncClient,
    cancel_token: CancellationToken,
    kernel_task: JoinHandle<Result<(), TransferError>>,
    config: Config,
}

impl MqttInstance {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// A publisher using the configured base topic, QoS and retain flag.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            self.client.clone(),
            &self.config.base_topic,
            self.config.qos(),
            self.config.retain,
        )
    }

    /// Stops the connection kernel and waits for it to finish.
    ///
    /// # Errors
    ///
    /// The kernel's own error, or `ClientSetup` if its task panicked.
    pub async fn shutdown(self) -> Result<(), TransferError> {
        self.cancel_token.cancel();
        match self.kernel_task.await {
            Ok(result) => result,
            Err(e) => Err(TransferError::ClientSetup(format!(
                "Connection kernel task failed: {}",
                e
            ))),
        }
    }
}
