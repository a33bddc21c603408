//! HTTP Polling Transport
//!
//! Fallback delivery path for environments where a persistent socket is not
//! available. Fetches a snapshot of every registered topic from the REST
//! endpoint on a fixed interval and emits the per-topic payloads as updates.
//!
//! Consecutive poll failures back off with the same policy the socket
//! transport uses for reconnects; a successful poll resets the policy. An
//! HTTP 401 is terminal: retrying cannot fix bad credentials.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    CommandReceiver, EventSender, Transport, TransportError, TransportEvent,
};
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::codec::{CodecError, FrameCodec, PollEntry};
use crate::infrastructure::health::HealthMonitor;
use crate::infrastructure::metrics::{self, TransportKind};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the polling transport.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Snapshot endpoint URL.
    pub base_url: String,
    /// Interval between polls.
    pub poll_interval: std::time::Duration,
    /// Per-request timeout.
    pub request_timeout: std::time::Duration,
    /// Optional bearer token sent with each request.
    pub auth_token: Option<String>,
    /// Backoff configuration for consecutive poll failures.
    pub reconnect: ReconnectConfig,
}

impl PollingConfig {
    /// Create a new configuration with default timing and backoff.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            poll_interval: std::time::Duration::from_secs(5),
            request_timeout: std::time::Duration::from_secs(10),
            auth_token: None,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create configuration from settings.
    #[must_use]
    pub fn from_settings(
        polling: &crate::infrastructure::config::PollingSettings,
        reconnect: &crate::infrastructure::config::ReconnectSettings,
        auth_token: Option<&crate::infrastructure::config::AuthToken>,
    ) -> Self {
        Self {
            base_url: polling.base_url.clone(),
            poll_interval: polling.poll_interval,
            request_timeout: polling.request_timeout,
            auth_token: auth_token.map(|t| t.value().to_string()),
            reconnect: ReconnectConfig::from_settings(reconnect),
        }
    }
}

/// Result of one poll request, before any events are emitted.
enum PollOutcome {
    /// No registered topics, nothing fetched.
    Skipped,
    /// Envelope decoded into per-topic entries.
    Decoded(Vec<PollEntry>),
    /// Request succeeded but the body was not a valid envelope.
    Malformed(String),
}

// =============================================================================
// Polling Transport
// =============================================================================

/// HTTP polling transport for market data.
pub struct PollingTransport {
    config: PollingConfig,
    codec: FrameCodec,
    client: reqwest::Client,
    registry: Arc<SubscriptionRegistry>,
    monitor: Arc<HealthMonitor>,
    event_tx: EventSender,
    commands: Mutex<CommandReceiver>,
    cancel: CancellationToken,
}

impl PollingTransport {
    /// Create a new polling transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: PollingConfig,
        registry: Arc<SubscriptionRegistry>,
        monitor: Arc<HealthMonitor>,
        event_tx: EventSender,
        commands: CommandReceiver,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            codec: FrameCodec::new(),
            client,
            registry,
            monitor,
            event_tx,
            commands: Mutex::new(commands),
            cancel,
        })
    }

    /// Fetch one snapshot of every registered topic.
    ///
    /// Per-topic errors inside a successful envelope are non-fatal;
    /// request-level failures and `success: false` envelopes bubble up for
    /// backoff.
    async fn poll_once(&self) -> Result<PollOutcome, TransportError> {
        let topics = self.registry.topics();
        if topics.is_empty() {
            tracing::trace!("No registered topics, skipping poll");
            return Ok(PollOutcome::Skipped);
        }

        self.monitor.record_send_attempt();
        metrics::record_send_attempt(TransportKind::Polling);

        let mut request = self
            .client
            .get(&self.config.base_url)
            .query(&[("symbols", topics.join(","))]);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(TransportError::AuthenticationFailed(
                "snapshot endpoint returned 401".to_string(),
            ));
        }

        if !response.status().is_success() {
            return Err(TransportError::ConnectionFailed(format!(
                "snapshot endpoint returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;

        match self.codec.decode_poll_envelope(&body) {
            Ok(entries) => Ok(PollOutcome::Decoded(entries)),
            // A backend reporting failure is a failed poll, not a parse
            // problem: it must drive the backoff path.
            Err(CodecError::UnsuccessfulResponse) => Err(TransportError::ConnectionFailed(
                "snapshot endpoint reported failure".to_string(),
            )),
            Err(e) => Ok(PollOutcome::Malformed(e.to_string())),
        }
    }

    /// Emit the events for one successful poll, updates in envelope order.
    async fn emit_outcome(&self, outcome: PollOutcome) -> Result<(), TransportError> {
        match outcome {
            PollOutcome::Skipped => Ok(()),
            PollOutcome::Malformed(detail) => {
                metrics::record_parse_error(TransportKind::Polling);
                self.send_event(TransportEvent::ParseFailed { detail }).await
            }
            PollOutcome::Decoded(entries) => {
                for entry in entries {
                    match entry {
                        PollEntry::Update(update) => {
                            metrics::record_message_received(
                                TransportKind::Polling,
                                &update.topic,
                            );
                            self.send_event(TransportEvent::Update(update)).await?;
                        }
                        PollEntry::Error { topic, message } => {
                            tracing::warn!(topic = %topic, msg = %message, "Per-topic poll error");
                            self.send_event(TransportEvent::Error(format!("{topic}: {message}")))
                                .await?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn send_event(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn name(&self) -> &'static str {
        "polling"
    }

    /// Run the poll loop until cancelled or terminally failed.
    async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut commands = self.commands.lock().await;

        tracing::info!(
            url = %self.config.base_url,
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting polling loop"
        );
        self.send_event(TransportEvent::Connected).await?;
        let mut healthy = true;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Polling transport cancelled");
                    return Ok(());
                }
                command = commands.recv() => {
                    // Topic set is read from the registry on each poll, so a
                    // command only needs to be acknowledged.
                    match command {
                        Some(cmd) => tracing::debug!(?cmd, "Subscription change noted"),
                        None => {
                            tracing::debug!("Command channel closed");
                            return Ok(());
                        }
                    }
                }
                _ = interval.tick() => {
                    match self.poll_once().await {
                        Ok(outcome) => {
                            // Recovery is announced before the updates the
                            // recovering poll produced.
                            if !healthy {
                                healthy = true;
                                self.send_event(TransportEvent::Connected).await?;
                            }
                            reconnect_policy.reset();
                            self.emit_outcome(outcome).await?;
                        }
                        Err(TransportError::ChannelClosed) => {
                            tracing::debug!("Event channel closed, stopping transport");
                            return Ok(());
                        }
                        Err(e @ TransportError::AuthenticationFailed(_)) => {
                            tracing::error!(error = %e, "Authentication rejected, stopping polls");
                            metrics::record_transport_error(TransportKind::Polling, "auth");
                            let _ = self.event_tx.send(TransportEvent::Error(e.to_string())).await;
                            return Err(e);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Poll failed");
                            metrics::record_transport_error(TransportKind::Polling, "poll");

                            if healthy {
                                healthy = false;
                                self.send_event(TransportEvent::Disconnected).await?;
                            }

                            if let Some(delay) = reconnect_policy.next_delay() {
                                let attempt = reconnect_policy.attempt_count();
                                tracing::info!(
                                    attempt,
                                    delay_ms = delay.as_millis(),
                                    "Backing off before next poll"
                                );
                                metrics::record_reconnect(TransportKind::Polling);

                                self.send_event(TransportEvent::Reconnecting { attempt }).await?;

                                tokio::select! {
                                    () = self.cancel.cancelled() => {
                                        tracing::info!("Polling transport cancelled during backoff");
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_transport(
        cancel: CancellationToken,
    ) -> (Arc<PollingTransport>, mpsc::Receiver<TransportEvent>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (event_tx, event_rx) = mpsc::channel(16);
        let (_command_tx, command_rx) = mpsc::channel(16);

        let transport = Arc::new(
            PollingTransport::new(
                PollingConfig::new("http://127.0.0.1:1/snapshot".to_string()),
                registry,
                Arc::new(HealthMonitor::new()),
                event_tx,
                command_rx,
                cancel,
            )
            .unwrap(),
        );
        (transport, event_rx)
    }

    #[test]
    fn config_defaults() {
        let config = PollingConfig::new("http://example.test/snapshot".to_string());
        assert_eq!(config.poll_interval, std::time::Duration::from_secs(5));
        assert_eq!(config.request_timeout, std::time::Duration::from_secs(10));
        assert!(config.auth_token.is_none());
    }

    #[tokio::test]
    async fn empty_topic_set_skips_request() {
        // Endpoint is unreachable; with no topics the poll must still succeed.
        let (transport, _event_rx) = make_transport(CancellationToken::new());
        let result = transport.poll_once().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancelled_transport_exits_cleanly() {
        let cancel = CancellationToken::new();
        let (transport, _event_rx) = make_transport(cancel.clone());

        cancel.cancel();
        let result = transport.run().await;
        assert!(result.is_ok());
    }
}
