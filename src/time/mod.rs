//! Clock injection for everything that waits: [`crate::loader::Loader`]
//! availability probes, [`crate::subscription_cache::SubscriptionCache`]
//! cleanup timers, and the bounded waits in [`crate::sync_validation`].

mod clock;

pub use clock::{Clock, MockClock, Sleep, SystemClock};
