//! The `[transport]` configuration section.

use std::time::Duration;

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// MQTT connection and publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_reconnect_delays"))]
pub struct Config {
    /// Publish through MQTT. When false payloads are only logged.
    pub enabled: bool,

    /// Prefix of every published topic. Empty disables the prefix.
    #[validate(length(max = 255, message = "Base topic must not exceed 255 characters"))]
    pub base_topic: String,

    /// Broker hostname or IP address.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client identifier. A random UUID is used when empty.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    pub clean_session: bool,

    /// How many requests the client may queue before `publish` waits.
    #[validate(range(min = 1, message = "Request channel capacity must be at least 1"))]
    pub request_channel_capacity: usize,

    /// Quality of service for payloads: 0, 1 or 2.
    #[validate(range(max = 2, message = "Invalid QoS value, must be 0, 1, or 2"))]
    pub qos: u8,

    /// Ask the broker to retain the last payload of every topic.
    pub retain: bool,

    /// First reconnect delay in seconds.
    #[validate(range(min = 1, message = "Reconnect delay must be at least 1 second"))]
    pub reconnect_delay: u64,

    /// Upper bound of the reconnect delay in seconds.
    pub max_reconnect_delay: u64,

    /// Reconnect attempts before giving up. 0 retries forever.
    pub max_reconnect_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            base_topic: "telemetry".to_string(),
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            request_channel_capacity: 10,
            qos: 1,
            retain: false,
            reconnect_delay: 1,
            max_reconnect_delay: 60,
            max_reconnect_attempts: 0,
        }
    }
}

impl Config {
    /// The configured QoS as a `rumqttc` value.
    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_delay)
    }

    /// Attempt limit, `None` when retrying forever.
    pub fn max_reconnect_attempts(&self) -> Option<u32> {
        match self.max_reconnect_attempts {
            0 => None,
            n => Some(n),
        }
    }
}

fn validate_reconnect_delays(config: &Config) -> Result<(), ValidationError> {
    if config.max_reconnect_delay < config.reconnect_delay {
        let mut err = ValidationError::new("invalid_reconnect_delay");
        err.message = Some(
            format!(
                "max_reconnect_delay ({}) must not be lower than reconnect_delay ({})",
                config.max_reconnect_delay, config.reconnect_delay
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert_eq!(config.max_reconnect_attempts(), None);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let cases = [
            Config {
                qos: 3,
                ..Default::default()
            },
            Config {
                port: 0,
                ..Default::default()
            },
            Config {
                host: String::new(),
                ..Default::default()
            },
            Config {
                keep_alive: 1,
                ..Default::default()
            },
            Config {
                client_id: "x".repeat(37),
                ..Default::default()
            },
            Config {
                request_channel_capacity: 0,
                ..Default::default()
            },
            Config {
                reconnect_delay: 10,
                max_reconnect_delay: 5,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }

    #[test]
    fn test_attempt_limit() {
        let config = Config {
            max_reconnect_attempts: 4,
            ..Default::default()
        };
        assert_eq!(config.max_reconnect_attempts(), Some(4));
    }

    #[test]
    fn test_qos_mapping() {
        for (raw, qos) in [
            (0, QoS::AtMostOnce),
            (1, QoS::AtLeastOnce),
            (2, QoS::ExactlyOnce),
        ] {
            let config = Config {
                qos: raw,
                ..Default::default()
            };
            assert_eq!(config.qos(), qos);
        }
    }
}
