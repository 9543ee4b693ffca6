//! The immutable per-CoValue header: `$schema` plus the group ruleset flag.

use std::fmt;

use crate::error::CoreError;
use crate::model::ids::CoId;

/// Reserved `$schema` string literals from §6.3. The `@metaSchema`/`@meta-schema`
/// aliases exist only for the diagnostic/inspector extraction path.
pub const SCHEMA_ACCOUNT: &str = "@account";
pub const SCHEMA_GROUP: &str = "@group";
pub const SCHEMA_GENESIS: &str = "GenesisSchema";
pub const SCHEMA_META_ALIAS_1: &str = "@meta-schema";
pub const SCHEMA_META_ALIAS_2: &str = "@metaSchema";

/// A resolved `header.$schema` value: either a governing schema co-id or one
/// of the three reserved strings a CoValue may carry at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaRef {
    CoValue(CoId),
    Account,
    Group,
    Genesis,
}

impl SchemaRef {
    /// Parses a raw header value. Anything that is neither a co-id nor one
    /// of the reserved strings is invalid (§3).
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            SCHEMA_ACCOUNT => Ok(Self::Account),
            SCHEMA_GROUP => Ok(Self::Group),
            SCHEMA_GENESIS => Ok(Self::Genesis),
            _ => CoId::parse(raw).map(Self::CoValue).map_err(|_| {
                CoreError::schema_missing(format!(
                    "'{raw}' is not a valid $schema (must be a co-id or a reserved string)"
                ))
            }),
        }
    }

    pub fn as_co_id(&self) -> Option<&CoId> {
        match self {
            Self::CoValue(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoValue(id) => write!(f, "{id}"),
            Self::Account => f.write_str(SCHEMA_ACCOUNT),
            Self::Group => f.write_str(SCHEMA_GROUP),
            Self::Genesis => f.write_str(SCHEMA_GENESIS),
        }
    }
}

/// Whether a CoValue's ruleset marks it as a permission group. Frozen at
/// creation, same as `$schema`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Ruleset {
    #[default]
    Ordinary,
    Group,
}

/// The immutable metadata carried at creation (§3). Account CoValues never
/// present `$schema`; group CoValues carry `ruleset = Group` instead.
#[derive(Clone, Debug, Default)]
pub struct Header {
    schema: Option<SchemaRef>,
    ruleset: Ruleset,
}

impl Header {
    pub fn new(schema: Option<SchemaRef>, ruleset: Ruleset) -> Self {
        Self { schema, ruleset }
    }

    pub fn for_schema(schema: SchemaRef) -> Self {
        Self {
            schema: Some(schema),
            ruleset: Ruleset::Ordinary,
        }
    }

    pub fn for_group() -> Self {
        Self {
            schema: None,
            ruleset: Ruleset::Group,
        }
    }

    pub fn for_account() -> Self {
        Self {
            schema: None,
            ruleset: Ruleset::Ordinary,
        }
    }

    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    pub fn is_group(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group)
    }
}
