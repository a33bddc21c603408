//! Configuration Module
//!
//! Configuration loading and dependency injection for the stream service.

mod settings;

pub use settings::{
    AuthToken, ChannelSettings, ConfigError, PollingSettings, ReconnectSettings, ServerSettings,
    SocketSettings, StreamConfig, TransportMode,
};
