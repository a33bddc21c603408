//! Infrastructure Layer
//!
//! Adapters and external integrations:
//!
//! - `transport`: WebSocket and HTTP polling channels to the backend
//! - `codec`: JSON frame and poll envelope encoding/decoding
//! - `dispatch`: cache write and consumer fan-out for decoded updates
//! - `config`: environment-based configuration
//! - `health`: connection state tracking and the health HTTP endpoint
//! - `metrics`: Prometheus metric registration and recording
//! - `telemetry`: OpenTelemetry tracing setup

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod telemetry;
pub mod transport;
