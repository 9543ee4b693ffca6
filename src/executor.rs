//! A minimal, dependency-free single-future executor.
//!
//! This crate deliberately carries no async runtime dependency (see
//! DESIGN.md's §9 deviations) — the sync/CRUD layer above only ever needs to
//! run one future to completion off the calling thread, so a thread-parking
//! `block_on`/`spawn` pair is the entire "task" surface it needs. Mirrors the
//! manual-`Waker` idiom [`crate::time::clock`] already uses for its sleeps.

use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;

struct ThreadWaker {
    signal: Arc<(Mutex<bool>, Condvar)>,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let (ready, condvar) = &*self.signal;
        *ready.lock().expect("executor signal lock poisoned") = true;
        condvar.notify_one();
    }
}

/// Polls `future` to completion on the calling thread, parking it whenever
/// the future returns `Pending` and resuming only when its waker fires.
pub fn block_on<F: Future>(future: F) -> F::Output {
    let signal = Arc::new((Mutex::new(false), Condvar::new()));
    let waker = Waker::from(Arc::new(ThreadWaker { signal: Arc::clone(&signal) }));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => {
                let (ready, condvar) = &*signal;
                let mut guard = ready.lock().expect("executor signal lock poisoned");
                while !*guard {
                    guard = condvar.wait(guard).expect("executor signal lock poisoned");
                }
                *guard = false;
            }
        }
    }
}

/// Fires `future` on a dedicated background thread and forgets the handle.
/// Used for reads that must return a `Loading` store immediately (§4.7.1)
/// and for collection refreshes triggered by a subscription callback
/// (§4.7.2) — neither caller waits on the result, they observe it through
/// the `ReactiveStore` the future eventually calls `set` on.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    thread::spawn(move || block_on(future));
}
