//! Heartbeat Manager
//!
//! Keeps the socket channel alive with periodic ping messages and detects
//! dead connections when the upstream stops answering with pongs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::SocketSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Timeout for pong response before connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `SocketSettings`.
    #[must_use]
    pub const fn from_settings(settings: &SocketSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            pong_timeout: settings.pong_timeout,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone)]
pub enum HeartbeatEvent {
    /// Request to send a ping message.
    SendPing,
    /// Heartbeat timeout occurred, connection should be restarted.
    Timeout,
}

/// State shared between the heartbeat manager and the socket read loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record that a pong was received.
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that we're waiting for a pong.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Check if we're currently waiting for a pong.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Get the time since last pong.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }

    /// Reset state for a new connection.
    pub fn reset(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn backdate_pong(&self, age: Duration) {
        *self.last_pong.write() = Instant::now().checked_sub(age).unwrap();
    }
}

/// Heartbeat manager that monitors connection health.
///
/// Runs as a spawned task alongside the socket read loop. Emits `SendPing`
/// on each tick; the socket loop sends the ping and calls `mark_ping_sent`.
/// When a pong does not arrive within the configured timeout, emits
/// `Timeout` and exits so the connection can be torn down.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the heartbeat monitoring loop until cancelled or timed out.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Check heartbeat state and send ping if needed.
    ///
    /// Returns `Err(())` if a timeout occurred and the loop should exit.
    async fn check_and_ping(&self) -> Result<(), ()> {
        if self.state.is_waiting_for_pong() {
            let elapsed = self.state.time_since_pong();
            if elapsed > self.config.pong_timeout {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    timeout_secs = self.config.pong_timeout.as_secs(),
                    "Heartbeat timeout detected"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return Err(());
        }

        Ok(())
    }
}
