//! Subscription Registry
//!
//! Domain types for tracking consumer subscriptions to market data topics.
//! Handles registration order, opaque subscription handles, and the 0→1/1→0
//! upstream side-effect decisions.
//!
//! # Design
//!
//! The registry tracks:
//! - Which consumers are registered for each topic, in registration order
//! - An opaque handle per registration, required for unsubscribe
//! - Whether a subscribe/unsubscribe is the first/last for its topic
//!
//! Duplicate registrations stack (list semantics): subscribing the same
//! callback twice yields two handles and requires two unsubscribes. The
//! 0→1 and 1→0 transitions tell the caller when an upstream subscribe or
//! unsubscribe is actually needed, so multiple consumers share one upstream
//! subscription per topic.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

// =============================================================================
// Types
// =============================================================================

/// A topic string identifying a data stream (a symbol, or a broadcast
/// channel like `market_overview`). Identity is exact string match.
pub type Topic = String;

/// Callback invoked with each payload delivered for a subscribed topic.
pub type Consumer = dyn Fn(&serde_json::Value) + Send + Sync;

/// Opaque handle identifying one registration.
///
/// Returned by [`SubscriptionRegistry::subscribe`] and required by
/// [`SubscriptionRegistry::unsubscribe`]. Handles are never reused within a
/// registry instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Get the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a subscribe call.
#[derive(Clone)]
pub struct SubscribeOutcome {
    /// Handle for the new registration.
    pub id: SubscriptionId,
    /// True if this was the first consumer for the topic, meaning an
    /// upstream "start receiving this topic" side effect is needed.
    pub first_for_topic: bool,
}

/// Result of an unsubscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// Registration removed.
    Removed {
        /// Topic the registration belonged to.
        topic: Topic,
        /// True if this was the last consumer for the topic, meaning an
        /// upstream "stop receiving this topic" side effect is needed.
        last_for_topic: bool,
    },
    /// No registration exists for the given handle.
    NotFound,
}

// =============================================================================
// Registry State
// =============================================================================

struct Registration {
    id: u64,
    consumer: Arc<Consumer>,
}

#[derive(Default)]
struct RegistryState {
    /// Map from topic to registrations in registration order.
    topics: HashMap<Topic, Vec<Registration>>,
    /// Map from handle to its topic, for unsubscribe by handle.
    index: HashMap<u64, Topic>,
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe registry mapping topics to ordered consumer lists.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use market_stream::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// let outcome = registry.subscribe("AAPL", Arc::new(|_payload| {}));
/// assert!(outcome.first_for_topic);
///
/// // Second consumer on the same topic - no upstream change needed
/// let second = registry.subscribe("AAPL", Arc::new(|_payload| {}));
/// assert!(!second.first_for_topic);
///
/// registry.unsubscribe(outcome.id);
/// registry.unsubscribe(second.id);
/// assert!(registry.topics().is_empty());
/// ```
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a consumer for a topic.
    ///
    /// Returns the registration handle and whether this was the first
    /// consumer for the topic. Registration order is preserved for fan-out.
    pub fn subscribe(&self, topic: impl Into<Topic>, consumer: Arc<Consumer>) -> SubscribeOutcome {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write();
        let entries = state.topics.entry(topic.clone()).or_default();
        let first_for_topic = entries.is_empty();
        entries.push(Registration { id, consumer });
        state.index.insert(id, topic);

        SubscribeOutcome {
            id: SubscriptionId(id),
            first_for_topic,
        }
    }

    /// Remove the registration for a handle.
    ///
    /// Returns whether the removal emptied its topic. Unknown handles
    /// (including already-removed ones) report `NotFound`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> UnsubscribeOutcome {
        let mut state = self.state.write();

        let Some(topic) = state.index.remove(&id.0) else {
            return UnsubscribeOutcome::NotFound;
        };

        let Some(entries) = state.topics.get_mut(&topic) else {
            return UnsubscribeOutcome::NotFound;
        };

        entries.retain(|r| r.id != id.0);

        let last_for_topic = entries.is_empty();
        if last_for_topic {
            state.topics.remove(&topic);
        }

        UnsubscribeOutcome::Removed {
            topic,
            last_for_topic,
        }
    }

    /// Get all currently subscribed topics.
    ///
    /// Used to re-declare interest upstream after a reconnect.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.state.read().topics.keys().cloned().collect()
    }

    /// Get a snapshot of the consumers for a topic, in registration order.
    #[must_use]
    pub fn consumers(&self, topic: &str) -> Vec<Arc<Consumer>> {
        self.state
            .read()
            .topics
            .get(topic)
            .map(|entries| entries.iter().map(|r| Arc::clone(&r.consumer)).collect())
            .unwrap_or_default()
    }

    /// Number of registrations for a topic.
    #[must_use]
    pub fn consumer_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Remove every registration. Used on explicit teardown only.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.topics.clear();
        state.index.clear();
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            topic_count: state.topics.len(),
            registration_count: state.index.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    /// Number of topics with at least one consumer.
    pub topic_count: usize,
    /// Total registrations across all topics.
    pub registration_count: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn noop() -> Arc<Consumer> {
        Arc::new(|_payload| {})
    }

    #[test]
    fn subscribe_first_consumer_for_topic() {
        let registry = SubscriptionRegistry::new();

        let outcome = registry.subscribe("AAPL", noop());

        assert!(outcome.first_for_topic);
        assert_eq!(registry.topics(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn subscribe_existing_topic_not_first() {
        let registry = SubscriptionRegistry::new();

        registry.subscribe("AAPL", noop());
        let second = registry.subscribe("AAPL", noop());

        assert!(!second.first_for_topic);
        assert_eq!(registry.consumer_count("AAPL"), 2);
    }

    #[test]
    fn duplicate_callback_stacks() {
        let registry = SubscriptionRegistry::new();
        let consumer = noop();

        let a = registry.subscribe("AAPL", Arc::clone(&consumer));
        let b = registry.subscribe("AAPL", Arc::clone(&consumer));

        assert_ne!(a.id, b.id);
        assert_eq!(registry.consumer_count("AAPL"), 2);

        // First unsubscribe leaves the other registration in place
        let outcome = registry.unsubscribe(a.id);
        assert_eq!(
            outcome,
            UnsubscribeOutcome::Removed {
                topic: "AAPL".to_string(),
                last_for_topic: false,
            }
        );
        assert_eq!(registry.consumer_count("AAPL"), 1);
    }

    #[test]
    fn unsubscribe_last_consumer_removes_topic() {
        let registry = SubscriptionRegistry::new();

        let outcome = registry.subscribe("AAPL", noop());
        let removal = registry.unsubscribe(outcome.id);

        assert_eq!(
            removal,
            UnsubscribeOutcome::Removed {
                topic: "AAPL".to_string(),
                last_for_topic: true,
            }
        );
        assert!(registry.topics().is_empty());
    }

    #[test]
    fn unsubscribe_unknown_handle() {
        let registry = SubscriptionRegistry::new();

        let outcome = registry.subscribe("AAPL", noop());
        registry.unsubscribe(outcome.id);

        // Second removal of the same handle is a no-op
        assert_eq!(registry.unsubscribe(outcome.id), UnsubscribeOutcome::NotFound);
    }

    #[test]
    fn consumers_returned_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.subscribe(
                "AAPL",
                Arc::new(move |_payload| {
                    order.lock().unwrap().push(label);
                }),
            );
        }

        for consumer in registry.consumers("AAPL") {
            consumer(&serde_json::Value::Null);
        }

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn consumers_unknown_topic_empty() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.consumers("UNKNOWN").is_empty());
    }

    #[test]
    fn unsubscribe_middle_preserves_order() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _a = registry.subscribe("AAPL", noop());
        let b = registry.subscribe("AAPL", noop());
        let calls_clone = Arc::clone(&calls);
        let _c = registry.subscribe(
            "AAPL",
            Arc::new(move |_payload| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.unsubscribe(b.id);

        let consumers = registry.consumers("AAPL");
        assert_eq!(consumers.len(), 2);
        consumers[1](&serde_json::Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topics_lists_all_subscribed() {
        let registry = SubscriptionRegistry::new();

        registry.subscribe("AAPL", noop());
        registry.subscribe("MSFT", noop());

        let mut topics = registry.topics();
        topics.sort();
        assert_eq!(topics, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn clear_removes_everything() {
        let registry = SubscriptionRegistry::new();

        registry.subscribe("AAPL", noop());
        registry.subscribe("MSFT", noop());
        registry.clear();

        assert!(registry.topics().is_empty());
        assert_eq!(registry.stats().registration_count, 0);
    }

    #[test]
    fn stats_are_accurate() {
        let registry = SubscriptionRegistry::new();

        registry.subscribe("AAPL", noop());
        registry.subscribe("AAPL", noop());
        registry.subscribe("MSFT", noop());

        let stats = registry.stats();
        assert_eq!(stats.topic_count, 2);
        assert_eq!(stats.registration_count, 3);
    }

    #[test]
    fn handles_are_unique() {
        let registry = SubscriptionRegistry::new();

        let a = registry.subscribe("AAPL", noop());
        let b = registry.subscribe("MSFT", noop());

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn thread_safety_concurrent_subscriptions() {
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let mut handles = vec![];

        for i in 0..10 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.subscribe(format!("SYM{i}"), Arc::new(|_payload| {}));
                r.subscribe("SHARED", Arc::new(|_payload| {}));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = registry.stats();
        // 10 unique symbols + 1 shared topic
        assert_eq!(stats.topic_count, 11);
        assert_eq!(stats.registration_count, 20);
        assert_eq!(registry.consumer_count("SHARED"), 10);
    }
}
