//! [`ReactiveStore`]: the single-value, synchronously-notifying container
//! every read operation in this crate ultimately returns (§4.1).

use std::sync::{Arc, Mutex};

/// A subscriber callback. Invoked synchronously from `set`, on whatever
/// thread/task called it — there is no dispatch queue. `Arc`-wrapped so
/// `set` can snapshot the listener list without holding the listeners lock
/// across the notification loop.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: Mutex<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: Mutex<u64>,
}

/// A composable teardown hook returned by [`ReactiveStore::subscribe`].
/// Calling it more than once is a no-op; dropping it without calling it
/// leaves the subscription live (callers that need RAII teardown should
/// wrap this in their own guard, as [`crate::subscription_cache`] does).
pub struct Unsubscribe {
    action: Box<dyn FnMut() + Send>,
}

impl Unsubscribe {
    fn new(action: impl FnMut() + Send + 'static) -> Self {
        Self {
            action: Box::new(action),
        }
    }

    pub fn call(&mut self) {
        (self.action)();
    }
}

/// Generic single-valued reactive container (§4.1). Performs no equality
/// check on `_set` — deduplication of redundant emissions is the
/// producer's responsibility (see `crud`'s collection-read gate).
pub struct ReactiveStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReactiveStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> ReactiveStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    /// The last emitted value.
    pub fn value(&self) -> T {
        self.inner.value.lock().expect("store value lock poisoned").clone()
    }

    /// Registers `listener`, invoked synchronously on every subsequent
    /// `set`. The returned [`Unsubscribe`] is idempotent.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let id = {
            let mut next_id = self.inner.next_id.lock().expect("store id lock poisoned");
            let id = *next_id;
            *next_id += 1;
            id
        };
        self.inner
            .listeners
            .lock()
            .expect("store listeners lock poisoned")
            .push((id, Arc::new(listener)));

        let inner = Arc::clone(&self.inner);
        let mut done = false;
        Unsubscribe::new(move || {
            if done {
                return;
            }
            done = true;
            inner
                .listeners
                .lock()
                .expect("store listeners lock poisoned")
                .retain(|(existing, _)| *existing != id);
        })
    }

    /// Updates the value and notifies every subscriber present at the
    /// start of this call — listeners added mid-notification (from within
    /// another listener) do not see this emission.
    ///
    /// The listener list is snapshotted and the lock released before any
    /// callback runs: a listener that itself calls `subscribe`/`set` on this
    /// same store (as a nested observer does) would otherwise deadlock on
    /// the non-reentrant listener mutex.
    pub fn set(&self, value: T) {
        *self.inner.value.lock().expect("store value lock poisoned") = value.clone();
        let snapshot: Vec<Listener<T>> = {
            let listeners = self.inner.listeners.lock().expect("store listeners lock poisoned");
            listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
        };
        for listener in &snapshot {
            listener(&value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().expect("store listeners lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_fire_synchronously_on_set() {
        let store = ReactiveStore::new(0i32);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let _unsub = store.subscribe(move |v| {
            seen_clone.store(*v as usize, Ordering::SeqCst);
        });
        store.set(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_delivery() {
        let store = ReactiveStore::new(0i32);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let mut unsub = store.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        store.set(1);
        unsub.call();
        unsub.call();
        store.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn notification_snapshot_excludes_listeners_added_mid_call() {
        let store = ReactiveStore::new(0i32);
        let added = Arc::new(AtomicUsize::new(0));
        let store_clone = store.clone();
        let added_for_outer = Arc::clone(&added);
        let added_for_inner = Arc::clone(&added);
        let _outer = store.subscribe(move |_| {
            added_for_outer.fetch_add(1, Ordering::SeqCst);
            let _inner = store_clone.subscribe(move |_| {
                added_for_inner.fetch_add(100, Ordering::SeqCst);
            });
        });
        store.set(1);
        assert_eq!(added.load(Ordering::SeqCst), 1);
        store.set(2);
        assert_eq!(added.load(Ordering::SeqCst), 102);
    }
}
