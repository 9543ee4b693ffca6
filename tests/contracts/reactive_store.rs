//! Contract: a [`ReactiveStore`] fans out to every listener present at the
//! start of a `set` call, and teardown via `Unsubscribe` is final.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use maia_core::prelude::*;

#[test]
fn multiple_subscribers_all_observe_every_emission() {
    let store = ReactiveStore::new(0u32);
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let a_clone = Arc::clone(&a);
    let _sub_a = store.subscribe(move |v| a_clone.store(*v as usize, Ordering::SeqCst));
    let b_clone = Arc::clone(&b);
    let _sub_b = store.subscribe(move |v| b_clone.store(*v as usize, Ordering::SeqCst));

    store.set(7);

    assert_eq!(a.load(Ordering::SeqCst), 7);
    assert_eq!(b.load(Ordering::SeqCst), 7);
    assert_eq!(store.value(), 7);
}

#[test]
fn unsubscribed_listener_no_longer_receives_emissions() {
    let store = ReactiveStore::new("init".to_string());
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = Arc::clone(&seen);
    let mut unsub = store.subscribe(move |_| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.set("first".to_string());
    unsub.call();
    store.set("second".to_string());

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(store.value(), "second");
    assert_eq!(store.listener_count(), 0);
}
