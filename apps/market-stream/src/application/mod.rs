//! Application Layer
//!
//! Use cases and port definitions: the [`service::MarketDataService`]
//! composition root and the [`ports::Transport`] seam the concrete
//! transports plug into.

pub mod ports;
pub mod service;
