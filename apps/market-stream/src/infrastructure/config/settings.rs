//! Stream Service Configuration Settings
//!
//! Configuration types for the market data stream service, loaded from
//! environment variables.

use std::time::Duration;

/// Which transport carries market data from the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Persistent WebSocket connection with push delivery.
    #[default]
    Socket,
    /// Periodic HTTP polling against a snapshot endpoint.
    Polling,
}

impl TransportMode {
    /// Parse transport mode from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "polling" | "poll" | "http" => Self::Polling,
            _ => Self::Socket,
        }
    }

    /// Get the mode name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Polling => "polling",
        }
    }
}

/// Bearer token for the upstream feed API.
#[derive(Clone)]
pub struct AuthToken {
    token: String,
}

impl AuthToken {
    /// Create a new token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }

    /// Get the token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// WebSocket transport settings.
#[derive(Debug, Clone)]
pub struct SocketSettings {
    /// Upstream WebSocket endpoint URL.
    pub url: String,
    /// Timeout for the initial connection handshake.
    pub connect_timeout: Duration,
    /// Heartbeat ping interval.
    pub ping_interval: Duration,
    /// Heartbeat timeout before considering the connection dead.
    pub pong_timeout: Duration,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP polling transport settings.
#[derive(Debug, Clone)]
pub struct PollingSettings {
    /// Upstream snapshot endpoint URL.
    pub base_url: String,
    /// Interval between polls.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            poll_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Reconnection backoff settings shared by both transports.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub initial_delay: Duration,
    /// Maximum reconnection delay.
    pub max_delay: Duration,
    /// Delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Internal channel capacities.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the transport event channel.
    pub event_capacity: usize,
    /// Capacity of the transport command channel.
    pub command_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            event_capacity: 1_000,
            command_capacity: 100,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete stream service configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Active transport.
    pub mode: TransportMode,
    /// WebSocket settings.
    pub socket: SocketSettings,
    /// HTTP polling settings.
    pub polling: PollingSettings,
    /// Reconnection backoff settings.
    pub reconnect: ReconnectSettings,
    /// Internal channel capacities.
    pub channels: ChannelSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Optional bearer token for the upstream feed.
    pub auth_token: Option<AuthToken>,
    /// Topics to subscribe on startup (comma-separated in `MARKET_STREAM_TOPICS`).
    pub initial_topics: Vec<String>,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL for the selected transport is
    /// missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = std::env::var("MARKET_STREAM_MODE")
            .map(|s| TransportMode::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let socket = SocketSettings {
            url: std::env::var("MARKET_STREAM_SOCKET_URL").unwrap_or_default(),
            connect_timeout: parse_env_duration_secs(
                "MARKET_STREAM_CONNECT_TIMEOUT_SECS",
                SocketSettings::default().connect_timeout,
            ),
            ping_interval: parse_env_duration_secs(
                "MARKET_STREAM_PING_INTERVAL_SECS",
                SocketSettings::default().ping_interval,
            ),
            pong_timeout: parse_env_duration_secs(
                "MARKET_STREAM_PONG_TIMEOUT_SECS",
                SocketSettings::default().pong_timeout,
            ),
        };

        let polling = PollingSettings {
            base_url: std::env::var("MARKET_STREAM_POLL_URL").unwrap_or_default(),
            poll_interval: parse_env_duration_secs(
                "MARKET_STREAM_POLL_INTERVAL_SECS",
                PollingSettings::default().poll_interval,
            ),
            request_timeout: parse_env_duration_secs(
                "MARKET_STREAM_REQUEST_TIMEOUT_SECS",
                PollingSettings::default().request_timeout,
            ),
        };

        // The selected transport must have an endpoint.
        match mode {
            TransportMode::Socket if socket.url.is_empty() => {
                return Err(ConfigError::MissingEnvVar(
                    "MARKET_STREAM_SOCKET_URL".to_string(),
                ));
            }
            TransportMode::Polling if polling.base_url.is_empty() => {
                return Err(ConfigError::MissingEnvVar(
                    "MARKET_STREAM_POLL_URL".to_string(),
                ));
            }
            _ => {}
        }

        let reconnect = ReconnectSettings {
            initial_delay: parse_env_duration_millis(
                "MARKET_STREAM_RECONNECT_DELAY_INITIAL_MS",
                ReconnectSettings::default().initial_delay,
            ),
            max_delay: parse_env_duration_secs(
                "MARKET_STREAM_RECONNECT_DELAY_MAX_SECS",
                ReconnectSettings::default().max_delay,
            ),
            multiplier: parse_env_f64(
                "MARKET_STREAM_RECONNECT_DELAY_MULTIPLIER",
                ReconnectSettings::default().multiplier,
            ),
            max_attempts: parse_env_u32(
                "MARKET_STREAM_MAX_RECONNECT_ATTEMPTS",
                ReconnectSettings::default().max_attempts,
            ),
        };

        let channels = ChannelSettings {
            event_capacity: parse_env_usize(
                "MARKET_STREAM_EVENT_CAPACITY",
                ChannelSettings::default().event_capacity,
            ),
            command_capacity: parse_env_usize(
                "MARKET_STREAM_COMMAND_CAPACITY",
                ChannelSettings::default().command_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: parse_env_u16(
                "MARKET_STREAM_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let auth_token = std::env::var("MARKET_STREAM_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(AuthToken::new);

        let initial_topics = std::env::var("MARKET_STREAM_TOPICS")
            .map(|s| parse_topic_list(&s))
            .unwrap_or_default();

        Ok(Self {
            mode,
            socket,
            polling,
            reconnect,
            channels,
            server,
            auth_token,
            initial_topics,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
