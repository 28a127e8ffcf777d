//! Payload publishing.
//!
//! The `Dispatcher` drains payloads produced by the acquisition thread and
//! forwards them, one at a time and in order, to the configured [`Publisher`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::sink::Outbound;

/// Trait for publishers that ship payloads off-box.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one payload.
    async fn publish(
        &self,
        outbound: &Outbound,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publisher that only writes payloads to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait::async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        outbound: &Outbound,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Next Payload: {}", outbound.payload);
        Ok(())
    }
}

/// Drains the payload channel into a publisher.
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
    rx: mpsc::Receiver<Outbound>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, rx: mpsc::Receiver<Outbound>) -> Self {
        Self { publisher, rx }
    }

    /// Runs until every sender is gone. Returns the number of payloads that
    /// were published successfully.
    pub async fn run(mut self) -> usize {
        let mut published = 0;

        while let Some(outbound) = self.rx.recv().await {
            match self.publisher.publish(&outbound).await {
                Ok(()) => {
                    published += 1;
                    debug!("Published payload for '{}'", outbound.topic());
                }
                Err(e) => {
                    error!("Publish failed for '{}': {}", outbound.topic(), e);
                }
            }
        }

        info!("Payload channel closed after {} publications", published);
        published
    }
}

/// MQTT-specific publisher implementation.
#[cfg(feature = "mqtt")]
#[async_trait::async_trait]
impl Publisher for hive_telemetry_mqtt::Publisher {
    async fn publish(
        &self,
        outbound: &Outbound,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.publish_text(&outbound.topic(), outbound.payload.as_str())
            .await
            .map_err(|e| Box::new(e) as _)
    }
}
