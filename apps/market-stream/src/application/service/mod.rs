//! Market Data Service
//!
//! Composition root for the delivery layer. Owns the subscription registry,
//! the last-value cache, and the health monitor; runs one transport and a
//! single event pump that serializes all state mutation and fan-out.
//!
//! # Concurrency
//!
//! The transport emits [`TransportEvent`]s over a bounded channel. One pump
//! task drains that channel, so updates for a topic fan out in arrival order
//! and the cache never sees interleaved writes for a single event. Subscribe
//! and unsubscribe run on caller threads against the lock-protected registry
//! and notify the transport through a command channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Transport, TransportCommand, TransportError, TransportEvent};
use crate::domain::cache::DataCache;
use crate::domain::subscription::{
    Consumer, SubscribeOutcome, SubscriptionId, SubscriptionRegistry, Topic, UnsubscribeOutcome,
};
use crate::infrastructure::config::{StreamConfig, TransportMode};
use crate::infrastructure::dispatch::Dispatcher;
use crate::infrastructure::health::{ConnectionState, HealthMonitor, HealthSnapshot};
use crate::infrastructure::metrics;
use crate::infrastructure::transport::{
    PollingConfig, PollingTransport, SocketConfig, SocketTransport,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while assembling or running the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport construction or terminal failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Service
// =============================================================================

/// Background tasks owned by a running service.
pub struct ServiceHandles {
    /// The transport connection loop.
    pub transport: JoinHandle<()>,
    /// The event pump draining transport events.
    pub pump: JoinHandle<()>,
}

/// Real-time market data delivery service.
///
/// One instance per process. Cheap to share behind an `Arc`; all methods
/// take `&self`.
pub struct MarketDataService {
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<DataCache>,
    monitor: Arc<HealthMonitor>,
    command_tx: mpsc::Sender<TransportCommand>,
    cancel: CancellationToken,
}

impl MarketDataService {
    /// Build the service and start its transport and event pump.
    ///
    /// The returned handles resolve when the transport fails terminally or
    /// the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured transport cannot be constructed.
    pub fn start(
        config: &StreamConfig,
        cancel: CancellationToken,
    ) -> Result<(Arc<Self>, ServiceHandles), ServiceError> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let cache = Arc::new(DataCache::new());
        let monitor = Arc::new(HealthMonitor::new());

        let (event_tx, event_rx) = mpsc::channel(config.channels.event_capacity);
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_capacity);

        let transport: Arc<dyn Transport> = match config.mode {
            TransportMode::Socket => Arc::new(SocketTransport::new(
                SocketConfig::from_settings(&config.socket, &config.reconnect),
                registry.clone(),
                monitor.clone(),
                event_tx,
                command_rx,
                cancel.clone(),
            )),
            TransportMode::Polling => Arc::new(PollingTransport::new(
                PollingConfig::from_settings(
                    &config.polling,
                    &config.reconnect,
                    config.auth_token.as_ref(),
                ),
                registry.clone(),
                monitor.clone(),
                event_tx,
                command_rx,
                cancel.clone(),
            )?),
        };

        tracing::info!(mode = config.mode.as_str(), "Starting market data service");
        monitor.set_state(ConnectionState::Connecting);
        metrics::set_connection_state(ConnectionState::Connecting.as_str());

        let service = Arc::new(Self {
            registry,
            cache,
            monitor: monitor.clone(),
            command_tx,
            cancel,
        });

        let transport_handle = tokio::spawn({
            let monitor = monitor.clone();
            let name = transport.name();
            async move {
                match transport.run().await {
                    Ok(()) => {
                        tracing::info!(transport = name, "Transport stopped");
                        monitor.set_state(ConnectionState::Disconnected);
                        metrics::set_connection_state(ConnectionState::Disconnected.as_str());
                    }
                    Err(e) => {
                        tracing::error!(transport = name, error = %e, "Transport failed terminally");
                        monitor.record_connect_error(e.to_string());
                        monitor.set_state(ConnectionState::Error);
                        metrics::set_connection_state(ConnectionState::Error.as_str());
                    }
                }
            }
        });

        let pump_handle = tokio::spawn(service.clone().run_event_pump(event_rx));

        Ok((
            service,
            ServiceHandles {
                transport: transport_handle,
                pump: pump_handle,
            },
        ))
    }

    /// Drain transport events, updating state and fanning out data.
    async fn run_event_pump(self: Arc<Self>, mut event_rx: mpsc::Receiver<TransportEvent>) {
        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.cache.clone(),
            self.monitor.clone(),
        );

        while let Some(event) = event_rx.recv().await {
            match event {
                TransportEvent::Connected => {
                    tracing::info!("Transport connected");
                    self.monitor.set_state(ConnectionState::Connected);
                    metrics::set_connection_state(ConnectionState::Connected.as_str());
                }
                TransportEvent::Disconnected => {
                    tracing::warn!("Transport disconnected");
                    self.monitor.set_state(ConnectionState::Disconnected);
                    metrics::set_connection_state(ConnectionState::Disconnected.as_str());
                }
                TransportEvent::Reconnecting { attempt } => {
                    tracing::info!(attempt, "Transport reconnecting");
                    self.monitor.record_reconnect();
                    self.monitor.set_state(ConnectionState::Connecting);
                    metrics::set_connection_state(ConnectionState::Connecting.as_str());
                }
                TransportEvent::Update(update) => {
                    dispatcher.dispatch(&update);
                }
                TransportEvent::ParseFailed { detail } => {
                    tracing::warn!(detail = %detail, "Dropped malformed frame");
                    self.monitor.record_parse_error();
                }
                TransportEvent::Error(message) => {
                    tracing::warn!(msg = %message, "Upstream reported error");
                    self.monitor.record_connect_error(message);
                }
            }
        }

        tracing::debug!("Event channel closed, pump exiting");
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a consumer for a topic and return its handle.
    ///
    /// If the cache already holds a value for the topic, the consumer is
    /// invoked with it immediately, before registration, so a late
    /// subscriber catches up without waiting for the next update. Duplicate
    /// subscriptions are kept as distinct registrations: each delivery
    /// invokes the consumer once per registration, and each registration
    /// needs its own unsubscribe.
    pub fn subscribe(&self, topic: impl Into<Topic>, consumer: Arc<Consumer>) -> SubscriptionId {
        let topic = topic.into();

        // Catch-up delivery from the cache, isolated like regular fan-out.
        if let Some(payload) = self.cache.get(&topic) {
            let caught = std::panic::catch_unwind(AssertUnwindSafe(|| consumer(&payload)));
            if caught.is_err() {
                tracing::warn!(topic = %topic, "Consumer panicked during catch-up delivery");
                self.monitor.record_consumer_error();
                metrics::record_consumer_error(&topic);
            }
        }

        let SubscribeOutcome {
            id,
            first_for_topic,
        } = self.registry.subscribe(topic.clone(), consumer);

        if first_for_topic {
            self.notify_transport(TransportCommand::Subscribe(vec![topic.clone()]));
        }

        let stats = self.registry.stats();
        metrics::set_subscription_counts(stats.topic_count, stats.registration_count);
        tracing::debug!(topic = %topic, id = id.value(), "Consumer registered");

        id
    }

    /// Remove one registration. Returns `false` for an unknown or already
    /// removed handle.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.registry.unsubscribe(id) {
            UnsubscribeOutcome::Removed {
                topic,
                last_for_topic,
            } => {
                if last_for_topic {
                    self.notify_transport(TransportCommand::Unsubscribe(vec![topic.clone()]));
                }

                let stats = self.registry.stats();
                metrics::set_subscription_counts(stats.topic_count, stats.registration_count);
                tracing::debug!(topic = %topic, id = id.value(), "Consumer removed");
                true
            }
            UnsubscribeOutcome::NotFound => false,
        }
    }

    /// Topics with at least one registered consumer.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.registry.topics()
    }

    fn notify_transport(&self, command: TransportCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            // The registry stays authoritative; the transport re-reads it on
            // the next (re)connect or poll.
            tracing::debug!(error = %e, "Transport command not delivered");
        }
    }

    // =========================================================================
    // Cache Queries
    // =========================================================================

    /// Last cached payload for a topic, if any update has arrived.
    #[must_use]
    pub fn last_value(&self, topic: &str) -> Option<Value> {
        self.cache.get(topic)
    }

    /// Whether the cached value for a topic is older than `max_age`.
    ///
    /// A topic with no cached value is stale. A value exactly `max_age` old
    /// is still fresh.
    #[must_use]
    pub fn is_stale(&self, topic: &str, max_age: Duration) -> bool {
        self.cache.is_stale(topic, max_age)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Snapshot of connection state, counters, and timestamps.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        self.monitor.snapshot()
    }

    // =========================================================================
    // Shared State Accessors
    // =========================================================================

    /// The subscription registry.
    #[must_use]
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    /// The last-value cache.
    #[must_use]
    pub fn cache(&self) -> Arc<DataCache> {
        self.cache.clone()
    }

    /// The health monitor.
    #[must_use]
    pub fn monitor(&self) -> Arc<HealthMonitor> {
        self.monitor.clone()
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop the transport and event pump. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Shutting down market data service");
        }
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn socket_config() -> StreamConfig {
        let mut config = StreamConfig {
            mode: TransportMode::Socket,
            socket: crate::infrastructure::config::SocketSettings::default(),
            polling: crate::infrastructure::config::PollingSettings::default(),
            reconnect: crate::infrastructure::config::ReconnectSettings::default(),
            channels: crate::infrastructure::config::ChannelSettings::default(),
            server: crate::infrastructure::config::ServerSettings::default(),
            auth_token: None,
            initial_topics: Vec::new(),
        };
        // Unreachable endpoint; tests never wait for a connection.
        config.socket.url = "ws://127.0.0.1:1/never".to_string();
        config.reconnect.initial_delay = Duration::from_millis(10);
        config
    }

    fn started_service() -> Arc<MarketDataService> {
        let cancel = CancellationToken::new();
        let (service, _handles) = MarketDataService::start(&socket_config(), cancel).unwrap();
        service
    }

    #[tokio::test]
    async fn subscribe_returns_distinct_ids_for_duplicates() {
        let service = started_service();

        let a = service.subscribe("AAPL", Arc::new(|_p| {}));
        let b = service.subscribe("AAPL", Arc::new(|_p| {}));

        assert_ne!(a, b);
        assert_eq!(service.topics(), vec!["AAPL".to_string()]);
        service.shutdown();
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_per_handle() {
        let service = started_service();

        let id = service.subscribe("AAPL", Arc::new(|_p| {}));
        assert!(service.unsubscribe(id));
        assert!(!service.unsubscribe(id));
        assert!(service.topics().is_empty());
        service.shutdown();
    }

    #[tokio::test]
    async fn late_subscriber_catches_up_from_cache() {
        let service = started_service();
        service.cache().insert("AAPL", json!({"price": 150.0}));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        service.subscribe(
            "AAPL",
            Arc::new(move |payload| {
                sink.lock().unwrap().push(payload.clone());
            }),
        );

        assert_eq!(*seen.lock().unwrap(), vec![json!({"price": 150.0})]);
        service.shutdown();
    }

    #[tokio::test]
    async fn catch_up_skipped_without_cached_value() {
        let service = started_service();

        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let sink = seen.clone();
        service.subscribe(
            "MSFT",
            Arc::new(move |payload| {
                sink.lock().unwrap().push(payload.clone());
            }),
        );

        assert!(seen.lock().unwrap().is_empty());
        service.shutdown();
    }

    #[tokio::test]
    async fn panicking_catch_up_still_registers() {
        let service = started_service();
        service.cache().insert("AAPL", json!(1));

        let id = service.subscribe("AAPL", Arc::new(|_p| panic!("catch-up bug")));

        assert_eq!(service.registry().consumer_count("AAPL"), 1);
        assert_eq!(service.health().consumer_errors, 1);
        assert!(service.unsubscribe(id));
        service.shutdown();
    }

    #[tokio::test]
    async fn stale_queries_pass_through_to_cache() {
        let service = started_service();

        assert!(service.is_stale("AAPL", Duration::from_secs(60)));
        assert_eq!(service.last_value("AAPL"), None);

        service.cache().insert("AAPL", json!(2));
        assert!(!service.is_stale("AAPL", Duration::from_secs(60)));
        assert_eq!(service.last_value("AAPL"), Some(json!(2)));
        service.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let service = started_service();
        service.shutdown();
        service.shutdown();
    }
}
