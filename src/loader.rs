//! [`Loader`]: idempotently resolves a CoValue id into a locally
//! materialised core, optionally waiting for availability (§4.4).

use std::sync::Arc;
use std::time::Duration;

use crate::context::{CallContext, Deadline};
use crate::error::CoreError;
use crate::model::{CoId, CoValue};
use crate::runtime::CrdtRuntime;
use crate::time::Clock;

/// Default availability-probe budget (§5).
pub const DEFAULT_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    pub wait_for_available: bool,
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            wait_for_available: false,
            timeout: DEFAULT_AVAILABILITY_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct Loader {
    runtime: Arc<dyn CrdtRuntime>,
    clock: Arc<dyn Clock>,
}

impl Loader {
    pub fn new(runtime: Arc<dyn CrdtRuntime>, clock: Arc<dyn Clock>) -> Self {
        Self { runtime, clock }
    }

    /// Ensures `id` is resolved to a local core. Returns `Ok(None)` only
    /// when the runtime has no core at all and `wait_for_available` was not
    /// requested; a timed-out wait still returns whatever core exists
    /// (possibly still unavailable), never an error, matching the source's
    /// "returns regardless" behaviour.
    pub async fn ensure_loaded(
        &self,
        id: &CoId,
        options: LoadOptions,
    ) -> Result<Option<CoValue>, CoreError> {
        if let Some(existing) = self.runtime.get_co_value(id) {
            if existing.is_available() {
                return Ok(Some(existing));
            }
        } else if !options.wait_for_available {
            return Ok(None);
        }

        let deadline = Deadline::after(options.timeout, self.clock.as_ref());
        let ctx = CallContext::with_deadline(deadline);

        if !options.wait_for_available {
            // Fire-and-forget: kick the load but do not block the caller on it.
            let runtime = Arc::clone(&self.runtime);
            let id = id.clone();
            let immediate = CallContext::with_deadline(Deadline::after(Duration::ZERO, self.clock.as_ref()));
            let _ = runtime.load_co_value_core(&id, &immediate).await;
            return Ok(self.runtime.get_co_value(&id));
        }

        match self.runtime.load_co_value_core(id, &ctx).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == crate::error::ErrorKind::Timeout => {
                Ok(self.runtime.get_co_value(id))
            }
            Err(err) => Err(err),
        }
    }
}
