//! The CoValue data model: identifiers, headers, content shapes and the
//! `CoValue` type that ties them together (§3, §6).

pub mod content;
pub mod covalue;
pub mod header;
pub mod ids;

pub use content::{ContentVariant, GroupContent, ListContent, MapContent, Role, StreamContent};
pub use covalue::{CoValue, CoValueVariant};
pub use header::{Header, Ruleset, SchemaRef};
pub use ids::{CoId, Identifier, InstanceKind, RegistryRef};
