use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

/// The future type returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An injectable source of monotonic time.
///
/// Every bounded wait in this crate (availability probes, sync barriers,
/// subscription cleanup timers) goes through a `Clock` rather than calling
/// `Instant::now()`/`thread::sleep` directly, so tests can replace it with
/// [`MockClock`] and drive timeouts deterministically.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Real-time clock backed by a helper thread per sleep. Fine for the
/// control-plane-ish cadence of this crate (timeouts in the single-digit
/// seconds); a high-frequency deployment would inject a timer-wheel based
/// clock instead.
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(ThreadSleep::new(duration))
    }
}

struct ThreadSleep {
    state: Arc<ThreadSleepState>,
}

impl ThreadSleep {
    fn new(duration: Duration) -> Self {
        Self {
            state: ThreadSleepState::spawn(duration),
        }
    }
}

impl Future for ThreadSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.is_completed() {
            return Poll::Ready(());
        }
        self.state.register_waker(cx.waker());
        if self.state.is_completed() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

struct ThreadSleepState {
    completed: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl ThreadSleepState {
    fn spawn(duration: Duration) -> Arc<Self> {
        let state = Arc::new(Self {
            completed: AtomicBool::new(false),
            waker: Mutex::new(None),
        });
        let thread_state = Arc::clone(&state);
        thread::spawn(move || {
            thread::sleep(duration);
            thread_state.finish();
        });
        state
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn register_waker(&self, waker: &Waker) {
        *self.waker.lock().expect("sleep waker lock poisoned") = Some(waker.clone());
    }

    fn finish(&self) {
        self.completed.store(true, Ordering::Release);
        if let Some(waker) = self
            .waker
            .lock()
            .expect("sleep waker lock poisoned")
            .take()
        {
            waker.wake();
        }
    }
}

/// Virtual clock for deterministic tests: time only moves when [`MockClock::advance`]
/// is called, and every pending `sleep` due at or before the new offset wakes
/// in registration order.
#[derive(Clone, Debug)]
pub struct MockClock {
    inner: Arc<MockClockInner>,
}

#[derive(Debug)]
struct MockClockInner {
    state: Mutex<ClockState>,
}

#[derive(Debug)]
struct ClockState {
    origin: Instant,
    elapsed: Duration,
    sleepers: Vec<Arc<SleepState>>,
    next_id: usize,
}

impl MockClock {
    pub fn new() -> Self {
        let state = ClockState {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            sleepers: Vec::new(),
            next_id: 0,
        };
        Self {
            inner: Arc::new(MockClockInner {
                state: Mutex::new(state),
            }),
        }
    }

    pub fn advance(&self, delta: Duration) {
        if delta.is_zero() {
            return;
        }
        let mut to_wake = Vec::new();
        let mut guard = self.inner.state.lock().expect("clock state lock poisoned");
        guard.elapsed = guard.elapsed.saturating_add(delta);
        let elapsed = guard.elapsed;
        guard.sleepers.retain(|entry| {
            if entry.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            if elapsed >= entry.deadline {
                entry.completed.store(true, Ordering::SeqCst);
                if let Some(waker) = entry.take_waker() {
                    to_wake.push(waker);
                }
                false
            } else {
                true
            }
        });
        drop(guard);
        for waker in to_wake {
            waker.wake();
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.state.lock().expect("clock state lock poisoned").elapsed
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let guard = self.inner.state.lock().expect("clock state lock poisoned");
        guard.origin + guard.elapsed
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let state = {
            let mut guard = self.inner.state.lock().expect("clock state lock poisoned");
            let deadline = guard.elapsed.saturating_add(duration);
            let id = guard.next_id;
            guard.next_id += 1;
            let state = Arc::new(SleepState::new(id, deadline));
            guard.sleepers.push(Arc::clone(&state));
            state
        };
        Box::pin(MockSleep {
            inner: Arc::clone(&self.inner),
            state,
        })
    }
}

#[derive(Debug)]
struct SleepState {
    id: usize,
    deadline: Duration,
    waker: Mutex<Option<Waker>>,
    completed: AtomicBool,
    cancelled: AtomicBool,
}

impl SleepState {
    fn new(id: usize, deadline: Duration) -> Self {
        Self {
            id,
            deadline,
            waker: Mutex::new(None),
            completed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    fn take_waker(&self) -> Option<Waker> {
        self.waker.lock().expect("sleep state waker lock").take()
    }

    fn store_waker(&self, waker: &Waker) {
        let mut guard = self.waker.lock().expect("sleep state waker lock");
        if guard.as_ref().is_some_and(|existing| existing.will_wake(waker)) {
            return;
        }
        *guard = Some(waker.clone());
    }
}

struct MockSleep {
    inner: Arc<MockClockInner>,
    state: Arc<SleepState>,
}

impl Future for MockSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.cancelled.load(Ordering::SeqCst) || self.state.completed.load(Ordering::SeqCst) {
            return Poll::Ready(());
        }
        let elapsed = self.inner.state.lock().expect("clock state lock poisoned").elapsed;
        if elapsed >= self.state.deadline {
            self.state.completed.store(true, Ordering::SeqCst);
            return Poll::Ready(());
        }
        self.state.store_waker(cx.waker());
        Poll::Pending
    }
}

impl Drop for MockSleep {
    fn drop(&mut self) {
        if !self.state.completed.load(Ordering::SeqCst) {
            self.state.cancelled.store(true, Ordering::SeqCst);
            self.state.take_waker();
            if let Ok(mut guard) = self.inner.state.lock() {
                guard.sleepers.retain(|entry| entry.id != self.state.id);
            }
        }
    }
}
