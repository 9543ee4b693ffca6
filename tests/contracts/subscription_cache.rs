//! Contract: `SubscriptionCache` deduplicates `get_or_create`, destroys
//! exactly once, and a revived entry survives a racing deferred cleanup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::executor::block_on;
use maia_core::prelude::*;
use maia_core::subscription_cache::Subscription;

struct CountingSubscription {
    counter: Arc<AtomicUsize>,
}

impl Subscription for CountingSubscription {
    fn unsubscribe(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn id(s: &str) -> CoId {
    CoId::parse(format!("co_z{s}")).unwrap()
}

#[test]
fn revived_entry_survives_a_racing_scheduled_cleanup() {
    let clock = Arc::new(MockClock::new());
    let cache = SubscriptionCache::new(Arc::clone(&clock) as Arc<dyn Clock>);
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);
    let target = id("revived");

    cache.get_or_create(&target, move || Box::new(CountingSubscription { counter: counter_clone }));

    let (sleep, generation) = cache.schedule_cleanup(target.clone()).expect("entry exists");

    // Revive before the cleanup timer fires.
    let revive_counter = Arc::new(AtomicUsize::new(0));
    let revive_clone = Arc::clone(&revive_counter);
    cache.get_or_create(&target, move || Box::new(CountingSubscription { counter: revive_clone }));

    clock.advance(std::time::Duration::from_secs(5));
    block_on(sleep);
    cache.run_scheduled_cleanup(&target, generation);

    assert!(cache.has(&target), "revived entry must not be destroyed by a stale cleanup");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn node_scoped_cache_swaps_cleanly_between_nodes() {
    let clock: Arc<dyn Clock> = Arc::new(MockClock::new());
    let node_cache = NodeScopedCache::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);

    let cache_a = node_cache.attach("node-a", Arc::clone(&clock));
    cache_a.get_or_create(&id("x"), move || Box::new(CountingSubscription { counter: counter_clone }));
    assert_eq!(cache_a.size(), 1);

    let cache_b = node_cache.attach("node-b", clock);
    assert_eq!(counter.load(Ordering::SeqCst), 1, "switching nodes tears down the old node's subscriptions");
    assert_eq!(cache_b.size(), 0);
}
