//! The connection kernel.
//!
//! `ConnectionKernel` owns the `rumqttc` event loop. Polling the loop is what
//! actually connects, sends queued publishes and answers pings, so the kernel
//! must run on its own task for as long as payloads are published. Transient
//! failures are retried after an exponential backoff; fatal ones end the
//! kernel. Every state change is broadcast over a `watch` channel.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Packet};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{backoff::Backoff, error::TransferError, state::ConnectionState};

/// Drives the event loop and reconnects on failure.
pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    backoff: Backoff,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            backoff,
            cancel,
            state_tx,
            state_rx,
        }
    }

    /// Receiver of connection state changes. Sees the current state at once.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });

        if changed {
            info!("Connection state changed to: {}", state);
        }
    }

    /// Runs until cancelled, until a fatal error, or until the backoff
    /// gives up.
    ///
    /// # Errors
    ///
    /// `ClientConnection` for fatal connection errors, `RetriesPolicy` when
    /// the attempt limit is exhausted.
    pub async fn run(&mut self) -> Result<(), TransferError> {
        self.update_state(ConnectionState::Connecting);
        self.backoff.reset();

        info!("Starting connection event loop...");
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, disconnecting...");
                    self.disconnect();
                    self.update_state(ConnectionState::Disconnected("Shutdown requested".into()));
                    return Ok(());
                }

                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        if is_fatal_error(&e) {
                            error!("Fatal connection error: {}", root_cause(&e));
                            self.update_state(ConnectionState::Disconnected(e.to_string()));
                            return Err(TransferError::from(e));
                        }

                        let delay = match self.backoff.next_sleep() {
                            Ok(delay) => delay,
                            Err(e) => {
                                error!("Giving up on the broker: {}", e);
                                self.update_state(ConnectionState::Disconnected(e.to_string()));
                                return Err(e.into());
                            }
                        };

                        warn!(
                            "Reconnecting in {:.2} seconds due to error: {}",
                            delay.as_secs_f64(),
                            root_cause(&e)
                        );
                        self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));
                        Self::sleep_or_cancel(&self.cancel, delay).await;
                    }
                },
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connection established successfully.");
                    self.backoff.reset();
                    self.update_state(ConnectionState::Connected);
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(packet) => trace!("Incoming packet: {:?}", packet),
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
    }

    async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    /// Best effort: the connection closes either way.
    fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Error sending disconnect packet: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Fatal,
    Reconnect,
}

fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        ConnectionError::MqttState(_) => Fatal,
        ConnectionError::NotConnAck(_) => Fatal,
        ConnectionError::RequestsDone => Fatal,

        ConnectionError::Io(e) => match e.kind() {
            // Local misconfiguration, not a transient condition
            std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData => Fatal,
            _ => Reconnect,
        },

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Reconnect,

        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Fatal,
            _ => Reconnect,
        },

        // TLS and future variants
        #[allow(unreachable_patterns)]
        _ => Reconnect,
    }
}

fn is_fatal_error(err: &ConnectionError) -> bool {
    classify_connection_error(err) == Disposition::Fatal
}

/// Innermost message of an error chain, without quotes.
fn root_cause(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
