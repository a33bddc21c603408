//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Counts of data messages received and delivered
//! - **Connections**: Transport connection state and reconnect attempts
//! - **Subscriptions**: Active topic and consumer counts
//! - **Errors**: Parse failures, consumer failures, transport errors
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once or if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Message counters
    describe_counter!(
        "market_stream_messages_received_total",
        "Total data messages received from the upstream feed"
    );
    describe_counter!(
        "market_stream_messages_delivered_total",
        "Total consumer callback invocations"
    );
    describe_counter!(
        "market_stream_send_attempts_total",
        "Total outbound messages sent to the upstream feed"
    );

    // Connection gauges
    describe_gauge!(
        "market_stream_connection_state",
        "Transport connection state (1 = active for the labeled state)"
    );

    // Subscription gauges
    describe_gauge!(
        "market_stream_topics",
        "Number of topics with at least one consumer"
    );
    describe_gauge!(
        "market_stream_consumers",
        "Total number of registered consumers"
    );
    describe_gauge!(
        "market_stream_cache_entries",
        "Number of topics with a cached last value"
    );

    // Error counters
    describe_counter!(
        "market_stream_transport_errors_total",
        "Total transport errors by type"
    );
    describe_counter!(
        "market_stream_parse_errors_total",
        "Total malformed inbound frames dropped"
    );
    describe_counter!(
        "market_stream_consumer_errors_total",
        "Total consumer callback failures isolated during fan-out"
    );
    describe_counter!(
        "market_stream_reconnects_total",
        "Total reconnection attempts"
    );

    // Latency histograms
    describe_histogram!(
        "market_stream_dispatch_seconds",
        "Time to parse, cache, and fan out one inbound frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric label for the active transport.
#[derive(Debug, Clone, Copy)]
pub enum TransportKind {
    /// Persistent WebSocket connection.
    Socket,
    /// HTTP polling loop.
    Polling,
}

impl TransportKind {
    /// Stable string form used in metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Polling => "polling",
        }
    }
}

/// Record a data message received from the upstream feed.
pub fn record_message_received(transport: TransportKind, topic: &str) {
    counter!(
        "market_stream_messages_received_total",
        "transport" => transport.as_str(),
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record consumer callback invocations for one update.
pub fn record_messages_delivered(topic: &str, count: u64) {
    counter!(
        "market_stream_messages_delivered_total",
        "topic" => topic.to_string()
    )
    .increment(count);
}

/// Record an outbound message sent to the upstream feed.
pub fn record_send_attempt(transport: TransportKind) {
    counter!(
        "market_stream_send_attempts_total",
        "transport" => transport.as_str()
    )
    .increment(1);
}

/// Update the connection state gauge. Exactly one state label is 1.
pub fn set_connection_state(state: &str) {
    for candidate in ["disconnected", "connecting", "connected", "error"] {
        let value = if candidate == state { 1.0 } else { 0.0 };
        gauge!(
            "market_stream_connection_state",
            "state" => candidate
        )
        .set(value);
    }
}

/// Update the topic and consumer count gauges.
pub fn set_subscription_counts(topics: usize, consumers: usize) {
    #[allow(clippy::cast_precision_loss)]
    {
        gauge!("market_stream_topics").set(topics as f64);
        gauge!("market_stream_consumers").set(consumers as f64);
    }
}

/// Update the cache entry count gauge.
pub fn set_cache_entries(entries: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("market_stream_cache_entries").set(entries as f64);
}

/// Record a transport error.
pub fn record_transport_error(transport: TransportKind, error_type: &str) {
    counter!(
        "market_stream_transport_errors_total",
        "transport" => transport.as_str(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a malformed inbound frame.
pub fn record_parse_error(transport: TransportKind) {
    counter!(
        "market_stream_parse_errors_total",
        "transport" => transport.as_str()
    )
    .increment(1);
}

/// Record a consumer callback failure.
pub fn record_consumer_error(topic: &str) {
    counter!(
        "market_stream_consumer_errors_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(transport: TransportKind) {
    counter!(
        "market_stream_reconnects_total",
        "transport" => transport.as_str()
    )
    .increment(1);
}

/// Record dispatch duration for one inbound frame.
pub fn record_dispatch_duration(duration: Duration) {
    histogram!("market_stream_dispatch_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
