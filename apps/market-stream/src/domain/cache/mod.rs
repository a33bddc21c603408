//! Last-Known-Value Cache
//!
//! Stores the most recent payload per topic together with its receipt time.
//! Entries are overwritten on each new message and persist for the life of
//! the service instance; nothing is evicted automatically. `clear` exists
//! for explicit teardown only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

// =============================================================================
// Cache Entry
// =============================================================================

#[derive(Clone)]
struct CacheEntry {
    payload: Value,
    received_at: Instant,
}

// =============================================================================
// Data Cache
// =============================================================================

/// Thread-safe last-known-value store keyed by topic.
///
/// Reads never block on I/O and never trigger a network request; `get`
/// returns whatever the transport delivered last, or `None` if no message
/// for the topic has arrived yet.
pub struct DataCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store the latest payload for a topic, overwriting any previous entry.
    pub fn insert(&self, topic: impl Into<String>, payload: Value) {
        self.entries.write().insert(
            topic.into(),
            CacheEntry {
                payload,
                received_at: Instant::now(),
            },
        );
    }

    /// Get the last known payload for a topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Value> {
        self.entries.read().get(topic).map(|e| e.payload.clone())
    }

    /// Snapshot of every cached topic and its payload.
    #[must_use]
    pub fn get_all(&self) -> HashMap<String, Value> {
        self.entries
            .read()
            .iter()
            .map(|(topic, entry)| (topic.clone(), entry.payload.clone()))
            .collect()
    }

    /// Check whether a topic's entry is stale.
    ///
    /// Returns true when no entry exists, or when the entry is strictly
    /// older than `max_age`. An entry exactly `max_age` old is fresh.
    #[must_use]
    pub fn is_stale(&self, topic: &str, max_age: Duration) -> bool {
        self.entries
            .read()
            .get(topic)
            .is_none_or(|entry| entry.received_at.elapsed() > max_age)
    }

    /// Age of a topic's entry, if present.
    #[must_use]
    pub fn age(&self, topic: &str) -> Option<Duration> {
        self.entries
            .read()
            .get(topic)
            .map(|entry| entry.received_at.elapsed())
    }

    /// Number of cached topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every entry. Used on explicit teardown only.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_missing_topic_returns_none() {
        let cache = DataCache::new();
        assert!(cache.get("AAPL").is_none());
    }

    #[test]
    fn insert_then_get() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!({"price": 150}));

        assert_eq!(cache.get("AAPL"), Some(json!({"price": 150})));
    }

    #[test]
    fn insert_overwrites_previous_value() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!({"price": 150}));
        cache.insert("AAPL", json!({"price": 151}));

        assert_eq!(cache.get("AAPL"), Some(json!({"price": 151})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_all_snapshots_every_topic() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!(1));
        cache.insert("MSFT", json!(2));

        let all = cache.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("AAPL"), Some(&json!(1)));
        assert_eq!(all.get("MSFT"), Some(&json!(2)));
    }

    #[test]
    fn missing_topic_is_stale() {
        let cache = DataCache::new();
        assert!(cache.is_stale("AAPL", Duration::from_secs(60)));
    }

    #[test]
    fn fresh_entry_is_not_stale() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!(1));

        assert!(!cache.is_stale("AAPL", Duration::from_secs(60)));
    }

    #[test]
    fn old_entry_is_stale() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!(1));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.is_stale("AAPL", Duration::from_millis(5)));
    }

    #[test]
    fn staleness_boundary_uses_strict_comparison() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!(1));

        // An entry exactly max_age old is fresh; with max_age equal to the
        // entry's current age the strict comparison cannot flag it.
        let age = cache.age("AAPL").unwrap();
        assert!(!cache.is_stale("AAPL", age + Duration::from_secs(1)));
        assert!(cache.is_stale("AAPL", Duration::ZERO) || age == Duration::ZERO);
    }

    #[test]
    fn clear_removes_all_entries() {
        let cache = DataCache::new();
        cache.insert("AAPL", json!(1));
        cache.insert("MSFT", json!(2));

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.get("AAPL").is_none());
        assert!(cache.is_stale("AAPL", Duration::from_secs(3600)));
    }

    #[test]
    fn age_reports_elapsed_time() {
        let cache = DataCache::new();
        assert!(cache.age("AAPL").is_none());

        cache.insert("AAPL", json!(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.age("AAPL").unwrap() >= Duration::from_millis(10));
    }
}
