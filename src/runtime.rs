//! The narrow seam onto the CRDT transport/storage layer this crate builds
//! on top of but does not implement (§9 Design Notes).
//!
//! Everything above this trait — stores, the loader, group ops, schema
//! resolution, CRUD — only ever talks to a CoValue through a
//! `CrdtRuntime`. A production deployment wires in the real sync engine;
//! tests (behind the `test-support` feature) wire in an in-memory double.

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::model::{CoId, CoValue, ContentVariant, Header};
use crate::subscription_cache::Subscription;

/// The local account this runtime is acting as. Needed by group ops
/// (`accountMembers` role lookups) and the seeder (who the bootstrap writes
/// land as).
pub trait LocalIdentity {
    fn account_id(&self) -> &CoId;
    fn system_spark(&self) -> &str;
}

/// The CRDT runtime's view of a single CoValue, as handed back by
/// `CrdtRuntime::get_co_value`. Mirrors what a real sync engine keeps in its
/// local core table.
#[async_trait]
pub trait CrdtRuntime: LocalIdentity + Send + Sync + 'static {
    /// Synchronous lookup against whatever is already resident locally.
    /// `None` means "no local core at all yet", distinct from an available
    /// core with empty content.
    fn get_co_value(&self, id: &CoId) -> Option<CoValue>;

    /// Requests the runtime create (or start syncing) a local core for
    /// `id`, waiting up to `ctx`'s deadline for it to become available.
    async fn load_co_value_core(&self, id: &CoId, ctx: &CallContext) -> Result<CoValue, CoreError>;

    fn get_current_content(&self, id: &CoId) -> Option<ContentVariant> {
        self.get_co_value(id).map(|value| value.content().clone())
    }

    fn get_header(&self, id: &CoId) -> Option<Header> {
        self.get_co_value(id).map(|value| value.header().clone())
    }

    fn is_available(&self, id: &CoId) -> bool {
        self.get_co_value(id).is_some_and(|value| value.is_available())
    }

    /// Applies a content mutation and returns the updated CoValue. Rejected
    /// writes (permission, structural) surface as `Err`.
    async fn mutate(
        &self,
        id: &CoId,
        edit: Box<dyn FnOnce(&mut ContentVariant) + Send>,
    ) -> Result<CoValue, CoreError>;

    /// Creates a brand-new CoValue with the given header and initial
    /// content, returning its freshly minted id.
    async fn create_co_value(
        &self,
        header: Header,
        variant: crate::model::CoValueVariant,
        content: ContentVariant,
    ) -> Result<CoValue, CoreError>;

    /// Registers `listener` to run (synchronously, on whatever thread
    /// performed the mutation) every time `id`'s content changes through
    /// `mutate`. The store/CRUD layer drives [`crate::subscription_cache`]
    /// through this seam to keep single and collection reads live (§4.7.1,
    /// §4.7.2) — `CrdtRuntime` itself has no notion of stores.
    fn subscribe(&self, id: &CoId, listener: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription>;
}
