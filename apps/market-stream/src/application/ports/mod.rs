//! Transport Ports
//!
//! Seam between the delivery service and the concrete transports. Both the
//! WebSocket and HTTP polling transports implement [`Transport`] and report
//! activity through [`TransportEvent`] over a bounded channel; the service
//! pushes subscription changes back through [`TransportCommand`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::subscription::Topic;
use crate::infrastructure::codec::{CodecError, TopicUpdate};

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a running transport.
///
/// Events for one topic are emitted in the order the upstream delivered
/// them; the service processes them on a single task, so consumer fan-out
/// preserves that order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Channel is open and usable.
    Connected,
    /// Channel closed; a reconnect may follow.
    Disconnected,
    /// A reconnection attempt is starting.
    Reconnecting {
        /// Reconnection attempt number, starting at 1.
        attempt: u32,
    },
    /// A decoded topic update ready for fan-out.
    Update(TopicUpdate),
    /// An inbound frame could not be decoded and was dropped.
    ParseFailed {
        /// Decode failure detail for logging.
        detail: String,
    },
    /// Non-fatal upstream error, reported and carried on.
    Error(String),
}

/// Subscription changes pushed from the service to a running transport.
#[derive(Debug, Clone)]
pub enum TransportCommand {
    /// Start receiving these topics.
    Subscribe(Vec<Topic>),
    /// Stop receiving these topics.
    Unsubscribe(Vec<Topic>),
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection attempt failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Upstream rejected our credentials. Not retried.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Frame encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Event channel closed; the service side is gone.
    #[error("event channel closed")]
    ChannelClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed by the upstream.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Transport Trait
// =============================================================================

/// A channel to the upstream market data feed.
///
/// Implementations own their connection lifecycle: connecting, resubscribing
/// on reconnect, backoff, and heartbeats. At most one transport runs at a
/// time; the service selects one at startup based on configuration.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs and metrics ("socket" or "polling").
    fn name(&self) -> &'static str;

    /// Run the transport until cancelled or terminally failed.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` when the transport fails terminally:
    /// authentication rejection or exhausted reconnect attempts. Graceful
    /// cancellation returns `Ok(())`.
    async fn run(self: Arc<Self>) -> Result<(), TransportError>;
}

/// Sender half of the event channel handed to a transport.
pub type EventSender = mpsc::Sender<TransportEvent>;

/// Receiver half of the command channel handed to a transport.
pub type CommandReceiver = mpsc::Receiver<TransportCommand>;
