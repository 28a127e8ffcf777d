//! Error type for MQTT transfer operations.

use thiserror::Error;

/// The unified error type of this crate.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The client could not be set up from the configuration.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The client could not queue a request, usually because the
    /// connection kernel has stopped.
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Connection to the broker failed or was lost.
    ///
    /// Boxed to keep the enum small.
    #[error("Client connection error: {0}")]
    ClientConnection(Box<rumqttc::ConnectionError>),

    /// Reconnect attempts are exhausted.
    #[error("Retry policy error: {0}")]
    RetriesPolicy(#[from] super::backoff::BackoffError),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffError;

    #[test]
    fn test_transfer_error_display() {
        let err = TransferError::ClientSetup("bad host".into());
        assert_eq!(err.to_string(), "Client setup error: bad host");

        let err: TransferError = BackoffError::MaxAttemptLimitError(3).into();
        assert_eq!(
            err.to_string(),
            "Retry policy error: Maximum number of attempts exceeded: 3"
        );
    }

    #[test]
    fn test_connection_error_is_boxed() {
        let err: TransferError = rumqttc::ConnectionError::NetworkTimeout.into();
        assert!(matches!(err, TransferError::ClientConnection(_)));
    }

    #[test]
    fn test_transfer_error_is_std_error() {
        let err: Box<dyn std::error::Error + Send + Sync> =
            Box::new(TransferError::ClientSetup("test".into()));
        assert_eq!(err.to_string(), "Client setup error: test");
    }
}
