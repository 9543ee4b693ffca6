//! [`SubscriptionCache`]: a node-scoped map from CoValue id to a live
//! runtime subscription, with deferred destroy timers (§4.2).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::model::CoId;
use crate::time::Clock;

/// Anything `getOrCreate`'s factory can hand back: a live subscription that
/// knows how to tear itself down. The real implementation backing a
/// `CrdtRuntime` subscribes to core updates; `unsubscribe` must be callable
/// more than once without panicking (callers are expected, but not
/// required, to make it idempotent themselves).
pub trait Subscription: Send {
    fn unsubscribe(&mut self);
}

struct Entry {
    subscription: Box<dyn Subscription>,
    cleanup_generation: u64,
}

struct Inner {
    clock: Arc<dyn Clock>,
    default_cleanup_delay: std::time::Duration,
    entries: Mutex<HashMap<CoId, Entry>>,
}

/// One cache per CRDT node instance (§4.2). Construction takes a [`Clock`]
/// so cleanup timers are deterministic under test.
#[derive(Clone)]
pub struct SubscriptionCache {
    inner: Arc<Inner>,
}

const DEFAULT_CLEANUP_DELAY_SECS: u64 = 5;

impl SubscriptionCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                default_cleanup_delay: std::time::Duration::from_secs(DEFAULT_CLEANUP_DELAY_SECS),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the cached subscription for `id`, cancelling any pending
    /// destroy timer. Otherwise invokes `factory` and stores its result.
    pub fn get_or_create<F>(&self, id: &CoId, factory: F)
    where
        F: FnOnce() -> Box<dyn Subscription>,
    {
        let mut entries = self.inner.entries.lock().expect("subscription cache lock poisoned");
        match entries.get_mut(id) {
            Some(entry) => {
                entry.cleanup_generation += 1;
            }
            None => {
                entries.insert(
                    id.clone(),
                    Entry {
                        subscription: factory(),
                        cleanup_generation: 0,
                    },
                );
            }
        }
    }

    pub fn has(&self, id: &CoId) -> bool {
        self.inner
            .entries
            .lock()
            .expect("subscription cache lock poisoned")
            .contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.inner.entries.lock().expect("subscription cache lock poisoned").len()
    }

    /// Immediately tears down and removes `id`'s subscription. Swallows
    /// whatever `unsubscribe` does internally — this call itself cannot
    /// fail.
    pub fn destroy(&self, id: &CoId) {
        let entry = self
            .inner
            .entries
            .lock()
            .expect("subscription cache lock poisoned")
            .remove(id);
        if let Some(mut entry) = entry {
            entry.subscription.unsubscribe();
        }
    }

    /// Destroys every cached subscription. Used on node swap.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self
            .inner
            .entries
            .lock()
            .expect("subscription cache lock poisoned")
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for mut entry in drained {
            entry.subscription.unsubscribe();
        }
    }

    /// Schedules a deferred destroy for `id` after the default delay. A
    /// later `get_or_create` bumps `cleanup_generation`, so the stale timer
    /// observes the mismatch and no-ops instead of destroying a
    /// since-revived entry.
    ///
    /// The returned `(CoId, u64)` pair is the key a caller awaits
    /// [`SubscriptionCache::run_scheduled_cleanup`] with once the returned
    /// sleep resolves — the real runtime drives this from its own task
    /// spawner, so scheduling and firing are kept as separate steps here.
    pub fn schedule_cleanup(&self, id: CoId) -> Option<(crate::time::Sleep, u64)> {
        let mut entries = self.inner.entries.lock().expect("subscription cache lock poisoned");
        let entry = entries.get_mut(&id)?;
        entry.cleanup_generation += 1;
        let generation = entry.cleanup_generation;
        let sleep = self.inner.clock.sleep(self.inner.default_cleanup_delay);
        Some((sleep, generation))
    }

    /// Cancels a pending cleanup timer for `id` by bumping its generation,
    /// so any in-flight `run_scheduled_cleanup` observes a stale generation
    /// and no-ops.
    pub fn cancel_cleanup(&self, id: &CoId) {
        let mut entries = self.inner.entries.lock().expect("subscription cache lock poisoned");
        if let Some(entry) = entries.get_mut(id) {
            entry.cleanup_generation += 1;
        }
    }

    /// Runs the deferred destroy for `id` if its cleanup timer is still the
    /// one registered at generation `expected_generation`. Intended to be
    /// invoked once `clock.sleep` resolves; a stale generation means a
    /// `get_or_create` raced it and the destroy is skipped.
    pub fn run_scheduled_cleanup(&self, id: &CoId, expected_generation: u64) {
        let should_destroy = {
            let entries = self.inner.entries.lock().expect("subscription cache lock poisoned");
            entries
                .get(id)
                .is_some_and(|entry| entry.cleanup_generation == expected_generation)
        };
        if should_destroy {
            self.destroy(id);
        } else {
            warn!(co_id = %id, "skipped stale cleanup: subscription was revived");
        }
    }
}

/// Process-wide attachment point: the current node's cache, swapped
/// wholesale on re-login or node change (§4.2).
pub struct NodeScopedCache {
    state: Mutex<Option<(String, SubscriptionCache)>>,
}

impl NodeScopedCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Returns the cache for `node_id`, clearing and replacing the
    /// previous node's cache (invoking every pending `unsubscribe`) if
    /// `node_id` differs from the last call.
    pub fn attach(&self, node_id: &str, clock: Arc<dyn Clock>) -> SubscriptionCache {
        let mut guard = self.state.lock().expect("node cache lock poisoned");
        if let Some((existing_id, existing_cache)) = guard.as_ref() {
            if existing_id == node_id {
                return existing_cache.clone();
            }
            existing_cache.clear();
        }
        let fresh = SubscriptionCache::new(clock);
        *guard = Some((node_id.to_string(), fresh.clone()));
        fresh
    }
}

impl Default for NodeScopedCache {
    fn default() -> Self {
        Self::new()
    }
}
