#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream - Real-Time Market Data Delivery
//!
//! Maintains a single channel to the market data backend (WebSocket push or
//! HTTP polling) and fans received updates out to in-process consumers,
//! keeping a last-known-value cache so late subscribers catch up instantly.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core delivery logic and data types
//!   - `subscription`: Topic registry with ordered consumer lists
//!   - `cache`: Last-value cache with staleness queries
//!   - `sentiment`: Keyword-based sentiment scoring for news payloads
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport trait, events, and commands
//!   - `service`: The delivery service composition root
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `transport`: WebSocket and HTTP polling transports
//!   - `codec`: JSON frame and poll envelope codec
//!   - `dispatch`: Cache write and consumer fan-out
//!   - `config`: Configuration from environment variables
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──┐
//!             │    ┌────────────┐    ┌────────────┐──► Consumer 1
//!             ├───►│ Event pump │───►│ Dispatcher │──► Consumer 2
//! HTTP poll ──┘    └────────────┘    └─────┬──────┘──► Consumer N
//!                                          ▼
//!                                    last-value cache
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core delivery types with no external integrations.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::DataCache;
pub use domain::sentiment::{self, SentimentLabel, SentimentResult};
pub use domain::subscription::{
    Consumer, RegistryStats, SubscribeOutcome, SubscriptionId, SubscriptionRegistry, Topic,
    UnsubscribeOutcome,
};

// Application service and ports
pub use application::ports::{Transport, TransportCommand, TransportError, TransportEvent};
pub use application::service::{MarketDataService, ServiceError, ServiceHandles};

// Infrastructure config
pub use infrastructure::config::{
    AuthToken, ConfigError, PollingSettings, ReconnectSettings, ServerSettings, SocketSettings,
    StreamConfig, TransportMode,
};

// Codec types (for integration tests)
pub use infrastructure::codec::{
    CodecError, FrameCodec, InboundMessage, PollEntry, SubscribeRequest, TopicUpdate,
    UnsubscribeRequest,
};

// Health server
pub use infrastructure::health::{
    ConnectionState, HealthMonitor, HealthServer, HealthServerError, HealthServerState,
    HealthSnapshot,
};

// Metrics
pub use infrastructure::metrics::{TransportKind, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
