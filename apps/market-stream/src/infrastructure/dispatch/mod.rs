//! Update Dispatch
//!
//! Routes decoded topic updates to registered consumers. For each update the
//! dispatcher first stores the payload in the last-value cache, then invokes
//! every consumer for the topic synchronously in registration order.
//!
//! A consumer that panics is isolated: the panic is caught, counted, and the
//! remaining consumers still run. The dispatcher is driven from a single
//! service task, so updates for one topic are always fanned out in arrival
//! order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::cache::DataCache;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::codec::TopicUpdate;
use crate::infrastructure::health::HealthMonitor;
use crate::infrastructure::metrics;

/// Caches and fans out topic updates.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<DataCache>,
    monitor: Arc<HealthMonitor>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub const fn new(
        registry: Arc<SubscriptionRegistry>,
        cache: Arc<DataCache>,
        monitor: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            registry,
            cache,
            monitor,
        }
    }

    /// Cache an update and deliver it to every consumer of its topic.
    ///
    /// The cache is written before fan-out, so a consumer that reads the
    /// cache during its callback sees the value it is being handed. Updates
    /// for topics nobody subscribes to still refresh the cache.
    pub fn dispatch(&self, update: &TopicUpdate) {
        let started = Instant::now();

        self.monitor.record_message();
        self.cache.insert(&update.topic, update.payload.clone());
        metrics::set_cache_entries(self.cache.len());

        let consumers = self.registry.consumers(&update.topic);
        if consumers.is_empty() {
            tracing::trace!(topic = %update.topic, "No consumers for topic, cached only");
            metrics::record_dispatch_duration(started.elapsed());
            return;
        }

        let mut delivered: u64 = 0;
        for consumer in consumers {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| consumer(&update.payload)));

            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(topic = %update.topic, "Consumer panicked during fan-out");
                    self.monitor.record_consumer_error();
                    metrics::record_consumer_error(&update.topic);
                }
            }
        }

        metrics::record_messages_delivered(&update.topic, delivered);
        metrics::record_dispatch_duration(started.elapsed());
    }
}
