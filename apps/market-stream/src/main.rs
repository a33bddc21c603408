//! Market Stream Binary
//!
//! Starts the real-time market data delivery service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required (per transport)
//! - `MARKET_STREAM_SOCKET_URL`: WebSocket endpoint (socket mode)
//! - `MARKET_STREAM_POLL_URL`: Snapshot endpoint (polling mode)
//!
//! ## Optional
//! - `MARKET_STREAM_MODE`: "socket" | "polling" (default: socket)
//! - `MARKET_STREAM_AUTH_TOKEN`: Bearer token for the backend
//! - `MARKET_STREAM_TOPICS`: Comma-separated topics to subscribe on startup
//! - `MARKET_STREAM_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `MARKET_STREAM_POLL_INTERVAL_SECS`: Poll interval (default: 5)
//! - `MARKET_STREAM_PING_INTERVAL_SECS`: Socket keep-alive interval (default: 30)
//! - `MARKET_STREAM_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 5)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-stream)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_stream::infrastructure::health::{HealthServer, HealthServerState};
use market_stream::infrastructure::telemetry;
use market_stream::{MarketDataService, StreamConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Stream");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Build and start the delivery service (transport + event pump)
    let (service, handles) = MarketDataService::start(&config, shutdown_token.clone())?;

    // Startup subscriptions from MARKET_STREAM_TOPICS: each cached update is
    // traced so operators can watch delivery without a downstream consumer.
    for topic in &config.initial_topics {
        let log_topic = topic.clone();
        service.subscribe(
            topic.clone(),
            Arc::new(move |payload| {
                tracing::info!(topic = %log_topic, %payload, "Update");
            }),
        );
    }

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        service.monitor(),
        service.registry(),
        service.cache(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Market stream ready");

    await_shutdown(shutdown_token).await;

    service.shutdown();
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = handles.transport.await;
        let _ = handles.pump.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Tasks did not drain before the shutdown timeout"
        );
    }

    tracing::info!("Market stream stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        mode = config.mode.as_str(),
        health_port = config.server.health_port,
        initial_topics = config.initial_topics.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        socket_url = %config.socket.url,
        poll_url = %config.polling.base_url,
        "Backend endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
