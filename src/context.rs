//! Minimal call-scoped concurrency primitives: a deadline and a cooperative
//! cancellation flag, threaded through every bounded wait in this crate.
//!
//! This is a deliberately small slice of what a networked service needs —
//! no budgets, no backpressure signalling, no security context snapshot.
//! Everything here runs against a single local store, so the only things a
//! caller can reasonably ask for are "give up after T" and "stop early".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CoreError;
use crate::time::Clock;

/// A point in time by which an operation must resolve. §5's default budgets
/// (2s availability probe, 5s subscription cleanup, 10s sync wait) are all
/// expressed as a `Deadline::after(default, clock)`.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration, clock: &dyn Clock) -> Self {
        Self {
            at: clock.now() + duration,
        }
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.at.saturating_duration_since(clock.now())
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        clock.now() >= self.at
    }
}

/// A cooperative cancellation flag shared between whoever started a wait and
/// whoever may want to abandon it early (e.g. a store torn down mid-load).
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Threaded through loader/sync-validation calls: how long we're willing to
/// wait and whether the caller has since lost interest.
#[derive(Clone, Debug)]
pub struct CallContext {
    deadline: Option<Deadline>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_deadline(deadline: Deadline) -> Self {
        Self {
            deadline: Some(deadline),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration, clock: &dyn Clock) -> Self {
        Self::with_deadline(Deadline::after(timeout, clock))
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Returns an error if the deadline has passed or cancellation fired;
    /// callers check this at every suspension point rather than relying on
    /// preemption.
    pub fn check(&self, clock: &dyn Clock) -> Result<(), CoreError> {
        if self.cancellation.is_cancelled() {
            return Err(CoreError::timeout("operation cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if deadline.is_expired(clock) {
                return Err(CoreError::timeout("deadline exceeded"));
            }
        }
        Ok(())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
