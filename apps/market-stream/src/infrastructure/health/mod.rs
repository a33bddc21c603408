//! Health Check and Metrics Endpoint
//!
//! Tracks connection state and cumulative counters for the stream service,
//! and serves them over HTTP for the dashboard UI, load balancers, and
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the connection)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::cache::DataCache;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the transport. Exactly one value at a time;
/// transitions are serialized through the service's event pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel open and none being opened.
    Disconnected,
    /// A connection attempt (initial or reconnect) is in flight.
    Connecting,
    /// Channel open and delivering messages.
    Connected,
    /// Terminal failure (retries exhausted or authentication required);
    /// requires an explicit restart to resume.
    Error,
}

impl ConnectionState {
    /// Stable string form used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

// =============================================================================
// Health Monitor
// =============================================================================

/// Shared connection-state and counter store.
///
/// Counters are cumulative for the life of the service instance. All fields
/// are derived from transport and dispatch activity; the monitor holds no
/// independent state of its own.
pub struct HealthMonitor {
    state: RwLock<ConnectionState>,
    messages_received: AtomicU64,
    send_attempts: AtomicU64,
    connect_errors: AtomicU64,
    parse_errors: AtomicU64,
    consumer_errors: AtomicU64,
    reconnects: AtomicU64,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_disconnected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    /// Create a monitor in the disconnected state with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            messages_received: AtomicU64::new(0),
            send_attempts: AtomicU64::new(0),
            connect_errors: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            consumer_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_connected_at: RwLock::new(None),
            last_disconnected_at: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Transition the connection state, recording connect/disconnect
    /// timestamps.
    pub fn set_state(&self, state: ConnectionState) {
        let previous = {
            let mut guard = self.state.write();
            std::mem::replace(&mut *guard, state)
        };

        if state == ConnectionState::Connected && previous != ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
        }
        if previous == ConnectionState::Connected && state != ConnectionState::Connected {
            *self.last_disconnected_at.write() = Some(Utc::now());
        }
    }

    /// Record one received data message.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one outbound send attempt.
    pub fn record_send_attempt(&self) {
        self.send_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one connect or poll failure.
    pub fn record_connect_error(&self, message: impl Into<String>) {
        self.connect_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(message.into());
    }

    /// Record one malformed inbound frame.
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one consumer callback failure.
    pub fn record_consumer_error(&self) {
        self.consumer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one reconnect attempt.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages received so far.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Reconnect attempts so far.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Consumer callback failures so far.
    #[must_use]
    pub fn consumer_errors(&self) -> u64 {
        self.consumer_errors.load(Ordering::Relaxed)
    }

    /// Malformed inbound frames so far.
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    /// Read-only snapshot of state, counters, and timestamps.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            send_attempts: self.send_attempts.load(Ordering::Relaxed),
            connect_errors: self.connect_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            consumer_errors: self.consumer_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.read(),
            last_disconnected_at: *self.last_disconnected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Connection state at snapshot time.
    pub state: ConnectionState,
    /// Data messages received.
    pub messages_received: u64,
    /// Outbound send attempts.
    pub send_attempts: u64,
    /// Connect and poll failures.
    pub connect_errors: u64,
    /// Malformed inbound frames dropped.
    pub parse_errors: u64,
    /// Consumer callback failures isolated.
    pub consumer_errors: u64,
    /// Reconnect attempts.
    pub reconnects: u64,
    /// When the channel last became usable.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// When the channel last closed.
    pub last_disconnected_at: Option<DateTime<Utc>>,
    /// Most recent transport-level error message.
    pub last_error: Option<String>,
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connection state, counters, and timestamps.
    pub connection: HealthSnapshot,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStatus,
    /// Cache statistics.
    pub cache: CacheStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Channel connected and delivering.
    Healthy,
    /// Channel temporarily down but recovering.
    Degraded,
    /// Channel failed terminally.
    Unhealthy,
}

/// Subscription statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    /// Topics with at least one consumer.
    pub topics: usize,
    /// Total consumer registrations.
    pub consumers: usize,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    /// Topics with a cached value.
    pub entries: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    monitor: Arc<HealthMonitor>,
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<DataCache>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        monitor: Arc<HealthMonitor>,
        registry: Arc<SubscriptionRegistry>,
        cache: Arc<DataCache>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            monitor,
            registry,
            cache,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.monitor.state() == ConnectionState::Connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let connection = state.monitor.snapshot();
    let status = determine_health_status(connection.state);
    let registry_stats = state.registry.stats();

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection,
        subscriptions: SubscriptionStatus {
            topics: registry_stats.topic_count,
            consumers: registry_stats.registration_count,
        },
        cache: CacheStatus {
            entries: state.cache.len(),
        },
    }
}

const fn determine_health_status(state: ConnectionState) -> HealthStatus {
    match state {
        ConnectionState::Connected => HealthStatus::Healthy,
        ConnectionState::Connecting | ConnectionState::Disconnected => HealthStatus::Degraded,
        ConnectionState::Error => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
