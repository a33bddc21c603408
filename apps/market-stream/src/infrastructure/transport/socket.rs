//! WebSocket Transport
//!
//! Maintains a persistent WebSocket connection to the market data backend.
//! Inbound frames are JSON; data frames carry a topic in their `type` field.
//!
//! # Lifecycle
//!
//! Connect (with timeout), subscribe to every currently-registered topic,
//! then pump messages until the connection drops. On failure the transport
//! reconnects with exponential backoff and resubscribes; when attempts are
//! exhausted it fails terminally.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    CommandReceiver, EventSender, Transport, TransportCommand, TransportError, TransportEvent,
};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::codec::{
    FrameCodec, InboundMessage, PingMessage, PongMessage, SubscribeRequest, UnsubscribeRequest,
};
use crate::infrastructure::health::HealthMonitor;
use crate::infrastructure::metrics::{self, TransportKind};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the socket transport.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket URL.
    pub url: String,
    /// Timeout for the connection handshake.
    pub connect_timeout: std::time::Duration,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl SocketConfig {
    /// Create a new configuration with default reconnect and heartbeat
    /// behavior.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            connect_timeout: std::time::Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Create configuration from settings.
    #[must_use]
    pub fn from_settings(
        socket: &crate::infrastructure::config::SocketSettings,
        reconnect: &crate::infrastructure::config::ReconnectSettings,
    ) -> Self {
        Self {
            url: socket.url.clone(),
            connect_timeout: socket.connect_timeout,
            reconnect: ReconnectConfig::from_settings(reconnect),
            heartbeat: HeartbeatConfig::from_settings(socket),
        }
    }
}

// =============================================================================
// Socket Transport
// =============================================================================

/// WebSocket transport for market data.
///
/// Manages the connection lifecycle including:
/// - Subscribe-on-connect for all registered topics
/// - Heartbeat monitoring with application-level and protocol pings
/// - Automatic reconnection with exponential backoff
/// - Live subscription changes via the command channel
pub struct SocketTransport {
    config: SocketConfig,
    codec: FrameCodec,
    registry: Arc<SubscriptionRegistry>,
    monitor: Arc<HealthMonitor>,
    event_tx: EventSender,
    commands: Mutex<CommandReceiver>,
    cancel: CancellationToken,
}

impl SocketTransport {
    /// Create a new socket transport.
    #[must_use]
    pub fn new(
        config: SocketConfig,
        registry: Arc<SubscriptionRegistry>,
        monitor: Arc<HealthMonitor>,
        event_tx: EventSender,
        commands: CommandReceiver,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            registry,
            monitor,
            event_tx,
            commands: Mutex::new(commands),
            cancel,
        }
    }

    fn record_send_attempt(&self) {
        self.monitor.record_send_attempt();
        metrics::record_send_attempt(TransportKind::Socket);
    }

    /// Connect and pump messages until error or cancellation.
    ///
    /// Resets the reconnect policy once the handshake succeeds so a later
    /// drop starts backoff from the initial delay again.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), TransportError> {
        tracing::info!(url = %self.config.url, "Connecting to market data stream");

        let connect = tokio_tungstenite::connect_async(&self.config.url);
        let (ws_stream, _response) = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                TransportError::ConnectionFailed(format!(
                    "handshake timed out after {:?}",
                    self.config.connect_timeout
                ))
            })??;

        let (mut write, mut read) = ws_stream.split();

        reconnect_policy.reset();
        self.send_event(TransportEvent::Connected).await?;

        // Restore subscriptions for every registered topic.
        let topics = self.registry.topics();
        if !topics.is_empty() {
            tracing::info!(count = topics.len(), "Subscribing to registered topics");
            let frame = self.codec.encode(&SubscribeRequest::new(topics))?;
            self.record_send_attempt();
            write.send(Message::Text(frame.into())).await?;
        }

        // Set up heartbeat monitoring.
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_manager = HeartbeatManager::new(
            self.config.heartbeat.clone(),
            heartbeat_state.clone(),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _heartbeat_handle = tokio::spawn(heartbeat_manager.run());

        // Held for the life of this connection; only one connection exists
        // at a time.
        let mut commands = self.commands.lock().await;

        let result = self
            .pump_messages(
                &mut write,
                &mut read,
                &mut commands,
                &heartbeat_state,
                &mut heartbeat_rx,
            )
            .await;

        heartbeat_cancel.cancel();
        result
    }

    /// Process inbound frames, heartbeat ticks, and subscription commands.
    async fn pump_messages<W, R>(
        &self,
        write: &mut W,
        read: &mut R,
        commands: &mut CommandReceiver,
        heartbeat_state: &Arc<HeartbeatState>,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> Result<(), TransportError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
        R: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            self.record_send_attempt();
                            let frame = self.codec.encode(&PingMessage::default())?;
                            write.send(Message::Text(frame.into())).await?;
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            tracing::warn!("Heartbeat timeout, dropping connection");
                            return Err(TransportError::ConnectionClosed);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(cmd) => self.handle_command(write, cmd).await?,
                        None => {
                            tracing::debug!("Command channel closed");
                            return Ok(());
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_pong();
                            self.handle_text_frame(&text, write).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_pong();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(TransportError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore binary and other frame types.
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(TransportError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Handle a text frame from the upstream.
    ///
    /// Malformed frames are reported and dropped; they never tear down the
    /// connection.
    async fn handle_text_frame<W>(&self, text: &str, write: &mut W) -> Result<(), TransportError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                metrics::record_parse_error(TransportKind::Socket);
                self.send_event(TransportEvent::ParseFailed {
                    detail: e.to_string(),
                })
                .await?;
                return Ok(());
            }
        };

        for msg in messages {
            match msg {
                InboundMessage::Ping => {
                    self.record_send_attempt();
                    let frame = self.codec.encode(&PongMessage::default())?;
                    write.send(Message::Text(frame.into())).await?;
                }
                InboundMessage::Pong => {
                    // Already counted by record_pong on frame receipt.
                }
                InboundMessage::Subscribed { topics } => {
                    tracing::debug!(?topics, "Subscription confirmed");
                }
                InboundMessage::ServerError { message } => {
                    tracing::warn!(msg = %message, "Upstream error");
                    self.send_event(TransportEvent::Error(message)).await?;
                }
                InboundMessage::Update(update) => {
                    metrics::record_message_received(TransportKind::Socket, &update.topic);
                    self.send_event(TransportEvent::Update(update)).await?;
                }
            }
        }

        Ok(())
    }

    /// Apply a subscription change to the live connection.
    async fn handle_command<W>(
        &self,
        write: &mut W,
        command: TransportCommand,
    ) -> Result<(), TransportError>
    where
        W: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let frame = match command {
            TransportCommand::Subscribe(topics) => {
                tracing::debug!(?topics, "Sending subscribe request");
                self.codec.encode(&SubscribeRequest::new(topics))?
            }
            TransportCommand::Unsubscribe(topics) => {
                tracing::debug!(?topics, "Sending unsubscribe request");
                self.codec.encode(&UnsubscribeRequest::new(topics))?
            }
        };

        self.record_send_attempt();
        write.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    async fn send_event(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn name(&self) -> &'static str {
        "socket"
    }

    /// Run the connection loop until cancelled or terminally failed.
    async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Socket transport cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("Socket connection closed gracefully");
                    return Ok(());
                }
                Err(TransportError::ChannelClosed) => {
                    tracing::debug!("Event channel closed, stopping transport");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Socket connection error");
                    metrics::record_transport_error(TransportKind::Socket, "connection");
                    let _ = self.event_tx.send(TransportEvent::Disconnected).await;

                    if let Some(delay) = reconnect_policy.next_delay() {
                        let attempt = reconnect_policy.attempt_count();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to market data stream"
                        );
                        metrics::record_reconnect(TransportKind::Socket);

                        let _ = self
                            .event_tx
                            .send(TransportEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Socket transport cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        return Err(TransportError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SocketConfig::new("wss://example.test/stream".to_string());
        assert_eq!(config.connect_timeout, std::time::Duration::from_secs(10));
        assert_eq!(
            config.heartbeat.ping_interval,
            std::time::Duration::from_secs(30)
        );
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[tokio::test]
    async fn cancelled_transport_exits_cleanly() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (event_tx, _event_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let transport = Arc::new(SocketTransport::new(
            SocketConfig::new("ws://127.0.0.1:1/never".to_string()),
            registry,
            Arc::new(HealthMonitor::new()),
            event_tx,
            command_rx,
            cancel.clone(),
        ));

        cancel.cancel();
        let result = transport.run().await;
        assert!(result.is_ok());
    }
}
