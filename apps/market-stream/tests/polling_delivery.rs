//! Polling transport integration tests.
//!
//! Each test runs a local HTTP stub of the snapshot endpoint and a full
//! `MarketDataService` in polling mode against it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use market_stream::{
    ConnectionState, MarketDataService, PollingSettings, ReconnectSettings, ServerSettings,
    SocketSettings, StreamConfig, TransportMode,
};

const WAIT: Duration = Duration::from_secs(5);

fn polling_config(base_url: String) -> StreamConfig {
    StreamConfig {
        mode: TransportMode::Polling,
        socket: SocketSettings::default(),
        polling: PollingSettings {
            base_url,
            poll_interval: Duration::from_millis(100),
            request_timeout: Duration::from_secs(2),
        },
        reconnect: ReconnectSettings {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_attempts: 3,
        },
        channels: market_stream::infrastructure::config::ChannelSettings::default(),
        server: ServerSettings::default(),
        auth_token: None,
        initial_topics: Vec::new(),
    }
}

fn channel_consumer(tx: mpsc::Sender<Value>) -> Arc<market_stream::Consumer> {
    Arc::new(move |payload| {
        let _ = tx.try_send(payload.clone());
    })
}

/// Poll a condition until it yields a value or the deadline passes.
async fn wait_for<T>(deadline: Duration, mut probe: impl FnMut() -> Option<T>) -> T {
    timeout(deadline, async {
        loop {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met before deadline")
}

async fn spawn_stub(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/snapshot")
}

#[tokio::test]
async fn polled_snapshots_are_delivered_and_cached() {
    let app = Router::new().route(
        "/snapshot",
        get(|Query(params): Query<std::collections::HashMap<String, String>>| async move {
            // The poller must pass its registered topics along.
            assert!(params["symbols"].contains("AAPL"));
            axum::Json(json!({
                "success": true,
                "data": {"data": {"AAPL": {"price": 150.25}}}
            }))
        }),
    );
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, _handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    service.subscribe("AAPL", channel_consumer(tx));

    let delivered = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!({"price": 150.25}));
    assert_eq!(service.last_value("AAPL"), Some(json!({"price": 150.25})));

    service.shutdown();
}

#[tokio::test]
async fn per_topic_errors_do_not_block_other_topics() {
    let app = Router::new().route(
        "/snapshot",
        get(|| async {
            axum::Json(json!({
                "success": true,
                "data": {"data": {
                    "AAPL": {"price": 150.25},
                    "MSFT": {"error": "unknown symbol"}
                }}
            }))
        }),
    );
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, _handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    let (aapl_tx, mut aapl_rx) = mpsc::channel(16);
    let (msft_tx, mut msft_rx) = mpsc::channel(16);
    service.subscribe("AAPL", channel_consumer(aapl_tx));
    service.subscribe("MSFT", channel_consumer(msft_tx));

    let delivered = timeout(WAIT, aapl_rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!({"price": 150.25}));

    // The failed topic delivers nothing but is reported on the monitor.
    assert!(
        timeout(Duration::from_millis(300), msft_rx.recv())
            .await
            .is_err()
    );
    let last_error = wait_for(WAIT, || service.health().last_error).await;
    assert!(last_error.contains("MSFT"), "unexpected error: {last_error}");

    service.shutdown();
}

#[tokio::test]
async fn unauthorized_response_stops_polling_terminally() {
    let app = Router::new().route(
        "/snapshot",
        get(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
    );
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    service.subscribe("AAPL", Arc::new(|_p| {}));

    timeout(WAIT, handles.transport).await.unwrap().unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Error);

    service.shutdown();
}

#[tokio::test]
async fn repeated_failures_exhaust_backoff_and_fail_terminally() {
    let app = Router::new().route(
        "/snapshot",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    service.subscribe("AAPL", Arc::new(|_p| {}));

    // max_attempts = 3 with short delays; the transport must give up.
    timeout(WAIT, handles.transport).await.unwrap().unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Error);
    let reconnects = wait_for(WAIT, || {
        let n = service.health().reconnects;
        (n >= 3).then_some(n)
    })
    .await;
    assert!(reconnects >= 3);

    service.shutdown();
}

#[tokio::test]
async fn unsuccessful_envelopes_drive_backoff_not_parse_errors() {
    let app = Router::new().route(
        "/snapshot",
        get(|| async {
            axum::Json(json!({
                "success": false,
                "data": {"data": {}}
            }))
        }),
    );
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    service.subscribe("AAPL", Arc::new(|_p| {}));

    // A backend persistently answering success:false exhausts the backoff
    // like any other failed poll instead of looping at full poll rate.
    timeout(WAIT, handles.transport).await.unwrap().unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Error);

    let health = wait_for(WAIT, || {
        let h = service.health();
        (h.reconnects >= 3).then_some(h)
    })
    .await;
    assert_eq!(health.parse_errors, 0);

    service.shutdown();
}

#[tokio::test]
async fn recovery_after_transient_failures_resets_backoff() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/snapshot",
        get(
            |State(hits): State<Arc<AtomicUsize>>| async move {
                // First two polls fail, then the endpoint recovers.
                if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
                } else {
                    axum::Json(json!({
                        "success": true,
                        "data": {"data": {"AAPL": {"price": 99.5}}}
                    }))
                    .into_response()
                }
            },
        ),
    )
    .with_state(hits);
    let base_url = spawn_stub(app).await;

    let cancel = CancellationToken::new();
    let (service, _handles) =
        MarketDataService::start(&polling_config(base_url), cancel).unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    service.subscribe("AAPL", channel_consumer(tx));

    let delivered = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivered, json!({"price": 99.5}));
    assert_eq!(service.connection_state(), ConnectionState::Connected);

    service.shutdown();
}
