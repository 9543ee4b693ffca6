//! Convenience re-exports for the crate's public surface. Most downstream
//! code only needs `use maia_core::prelude::*;`.

pub use crate::context::{CallContext, CancellationToken, Deadline};
pub use crate::crud::{Crud, Filter, ReadOutcome};
pub use crate::error::{CoreError, ErrorKind};
pub use crate::extractor::{extract_flat, extract_normalised, CoType, Flat, Normalised, SchemaHint};
pub use crate::group_ops::{GroupInfo, GroupOps};
pub use crate::loader::{LoadOptions, Loader};
pub use crate::model::{
    CoId, CoValue, CoValueVariant, ContentVariant, GroupContent, Header, Identifier, ListContent,
    MapContent, RegistryRef, Role, Ruleset, SchemaRef, StreamContent,
};
pub use crate::runtime::{CrdtRuntime, LocalIdentity};
pub use crate::schema_index::SchemaIndex;
pub use crate::schema_resolver::{ResolveOptions, Resolved, ReturnType, SchemaResolver};
pub use crate::seeder::{SchemaSpec, SeedInput, SeedReport, Seeder};
pub use crate::store::{ReactiveStore, Unsubscribe};
pub use crate::subscription_cache::{NodeScopedCache, Subscription, SubscriptionCache};
pub use crate::sync_validation::{AllowAllValidator, Decision, IncomingHeader, SchemaValidator, SyncValidationHook};
pub use crate::time::{Clock, MockClock, Sleep, SystemClock};
