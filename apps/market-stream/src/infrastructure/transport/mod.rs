//! Transport Implementations
//!
//! Concrete channels to the market data backend. Exactly one transport runs
//! at a time, selected by configuration:
//!
//! - [`socket::SocketTransport`] - persistent WebSocket with push delivery
//! - [`polling::PollingTransport`] - periodic HTTP snapshot polling
//!
//! Both share the reconnection policy in [`reconnect`]; the socket transport
//! additionally runs the [`heartbeat`] keep-alive.

pub mod heartbeat;
pub mod polling;
pub mod reconnect;
pub mod socket;

pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use polling::{PollingConfig, PollingTransport};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use socket::{SocketConfig, SocketTransport};
