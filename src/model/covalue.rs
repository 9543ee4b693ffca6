//! [`CoValue`]: the id, header, content and availability of a single
//! CRDT-backed object, as returned by `BackendHandle::get_co_value` (§9).

use crate::model::content::ContentVariant;
use crate::model::header::Header;
use crate::model::ids::CoId;

/// The structural shape declared at creation. `Account` is tracked
/// separately from `Map` even though both store a [`ContentVariant::Map`]:
/// an account never presents `$schema` and carries reserved top-level keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoValueVariant {
    Map,
    List,
    Stream,
    Group,
    Account,
}

/// A single CoValue as seen by this crate: identity, frozen header, current
/// content, and whether a local core has actually been loaded yet.
///
/// Unavailable CoValues (`available = false`) carry a default-shaped empty
/// content until [`crate::loader::Loader::ensure_loaded`] resolves them.
#[derive(Clone, Debug)]
pub struct CoValue {
    id: CoId,
    variant: CoValueVariant,
    header: Header,
    content: ContentVariant,
    available: bool,
}

impl CoValue {
    pub fn new(
        id: CoId,
        variant: CoValueVariant,
        header: Header,
        content: ContentVariant,
        available: bool,
    ) -> Self {
        Self {
            id,
            variant,
            header,
            content,
            available,
        }
    }

    /// Constructs a not-yet-loaded placeholder: the id and declared variant
    /// are known (e.g. from a reference the caller already holds) but no
    /// content has arrived.
    pub fn unavailable(id: CoId, variant: CoValueVariant, header: Header) -> Self {
        let content = match variant {
            CoValueVariant::List => ContentVariant::List(Default::default()),
            CoValueVariant::Stream => ContentVariant::Stream(Default::default()),
            CoValueVariant::Group => ContentVariant::Group(Default::default()),
            CoValueVariant::Map | CoValueVariant::Account => ContentVariant::Map(Default::default()),
        };
        Self {
            id,
            variant,
            header,
            content,
            available: false,
        }
    }

    pub fn id(&self) -> &CoId {
        &self.id
    }

    pub fn variant(&self) -> CoValueVariant {
        self.variant
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn content(&self) -> &ContentVariant {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut ContentVariant {
        &mut self.content
    }

    pub fn set_content(&mut self, content: ContentVariant) {
        self.content = content;
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn mark_available(&mut self, content: ContentVariant) {
        self.content = content;
        self.available = true;
    }
}
