//! Publishing text payloads under the base topic.

use rumqttc::{AsyncClient, QoS};
use tracing::debug;

use super::error::TransferError;

/// Publishes payloads to `<base_topic>/<topic>`.
///
/// Cheap to clone. Publishing only queues the message; the connection
/// kernel sends it once the broker is reachable.
#[derive(Debug, Clone)]
pub struct Publisher {
    client: AsyncClient,
    base_topic: String,
    qos: QoS,
    retain: bool,
}

impl Publisher {
    pub fn new(client: AsyncClient, base_topic: &str, qos: QoS, retain: bool) -> Self {
        Self {
            client,
            base_topic: base_topic.to_string(),
            qos,
            retain,
        }
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Applies the base topic to `topic`.
    pub fn with_base_topic(&self, topic: &str) -> String {
        if self.base_topic.is_empty() {
            topic.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_topic.trim_end_matches('/'),
                topic.trim_start_matches('/')
            )
        }
    }

    /// Queues `payload` for `<base_topic>/<topic>`.
    ///
    /// # Errors
    ///
    /// `ClientTransfer` if the request cannot be queued, e.g. because the
    /// connection kernel has stopped.
    pub async fn publish_text(&self, topic: &str, payload: &str) -> Result<(), TransferError> {
        let full_topic = self.with_base_topic(topic);
        debug!("Publishing {} bytes to '{}'", payload.len(), full_topic);

        self.client
            .publish(full_topic, self.qos, self.retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rumqttc::MqttOptions;

    use super::*;

    #[tokio::test]
    async fn test_base_topic_is_applied() {
        let (client, _event_loop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 10);

        let publisher = Publisher::new(client.clone(), "telemetry/", QoS::AtLeastOnce, false);
        assert_eq!(
            publisher.with_base_topic("/beehive/insideTemp"),
            "telemetry/beehive/insideTemp"
        );

        let bare = Publisher::new(client, "", QoS::AtMostOnce, false);
        assert_eq!(bare.with_base_topic("beehive/insideTemp"), "beehive/insideTemp");
    }

    #[tokio::test]
    async fn test_publish_queues_while_event_loop_is_alive() {
        let (client, _event_loop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 10);
        let publisher = Publisher::new(client, "telemetry", QoS::AtLeastOnce, false);

        publisher
            .publish_text("beehive/insideTemp", "Mon Oct 19 16:54:03 2026,beehive,insideTemp,36.85")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_fails_once_event_loop_is_gone() {
        let (client, event_loop) =
            AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 10);
        drop(event_loop);
        let publisher = Publisher::new(client, "telemetry", QoS::AtLeastOnce, false);

        let err = publisher.publish_text("beehive/a", "x").await.unwrap_err();
        assert!(matches!(err, TransferError::ClientTransfer(_)));
    }
}
