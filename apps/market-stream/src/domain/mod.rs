//! Domain Layer - Core delivery types and business logic.
//!
//! This layer contains the core domain types for real-time data delivery
//! with no transport dependencies. All types here are pure Rust.

/// Last-known-value cache keyed by topic.
pub mod cache;

/// News sentiment keyword heuristic.
pub mod sentiment;

/// Subscription tracking and fan-out ordering.
pub mod subscription;
