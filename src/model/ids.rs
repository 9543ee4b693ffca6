//! CoValue identifiers and the registry-ref sigil grammar from
//! `°<spark>/...` strings down to a co-id.

use std::fmt;

use crate::error::CoreError;

/// Stable prefix every CoValue id carries (§6.3).
pub const CO_ID_PREFIX: &str = "co_z";

/// Sigil that opens a human-readable registry reference (U+00B0).
pub const REGISTRY_SIGIL: char = '\u{00B0}';

/// An opaque, immutable CoValue identifier (`co_z...`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoId(String);

impl CoId {
    /// Validates and wraps a raw id string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.starts_with(CO_ID_PREFIX) && raw.len() > CO_ID_PREFIX.len() {
            Ok(Self(raw))
        } else {
            Err(CoreError::structural(format!(
                "'{raw}' is not a valid co-id (missing '{CO_ID_PREFIX}' prefix)"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The sub-kind carried by an `INSTANCE_REF` (§6.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceKind {
    Actor,
    Inbox,
    View,
    Context,
    State,
    Style,
}

impl InstanceKind {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "actor" => Self::Actor,
            "inbox" => Self::Inbox,
            "view" => Self::View,
            "context" => Self::Context,
            "state" => Self::State,
            "style" => Self::Style,
            _ => return None,
        })
    }
}

/// A parsed human-readable registry reference, not yet resolved to a co-id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryRef {
    /// `°<spark>/schema/<path>`
    Schema { spark: String, path: String },
    /// `°<spark>/agent/<name>`
    Agent { spark: String, name: String },
    /// `°<spark>/<kind>/{actor|inbox|view|context|state|style}/<path>`
    Instance {
        spark: String,
        kind: String,
        sub: InstanceKind,
        path: String,
    },
}

impl RegistryRef {
    pub fn spark(&self) -> &str {
        match self {
            RegistryRef::Schema { spark, .. }
            | RegistryRef::Agent { spark, .. }
            | RegistryRef::Instance { spark, .. } => spark,
        }
    }
}

/// Any value the operation API or [`crate::schema_resolver::SchemaResolver`]
/// accepts where a "schema or id" is expected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    CoId(CoId),
    Registry(RegistryRef),
    /// A bare name, normalised by prefixing `<spark>/schema/`.
    BareName(String),
}

/// Parses `raw` per §6.1. Never touches the network; purely syntactic.
pub fn parse_identifier(raw: &str) -> Result<Identifier, CoreError> {
    if raw.starts_with(CO_ID_PREFIX) {
        return Ok(Identifier::CoId(CoId::parse(raw)?));
    }
    if let Some(rest) = raw.strip_prefix(REGISTRY_SIGIL) {
        return parse_registry_ref(rest).map(Identifier::Registry);
    }
    Ok(Identifier::BareName(raw.to_string()))
}

fn parse_registry_ref(rest: &str) -> Result<RegistryRef, CoreError> {
    let mut parts = rest.splitn(3, '/');
    let spark = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::structural("registry ref missing spark segment"))?
        .to_string();
    let kind = parts
        .next()
        .ok_or_else(|| CoreError::structural("registry ref missing kind segment"))?;
    let remainder = parts
        .next()
        .ok_or_else(|| CoreError::structural("registry ref missing path segment"))?;

    match kind {
        "schema" => Ok(RegistryRef::Schema {
            spark,
            path: remainder.to_string(),
        }),
        "agent" => Ok(RegistryRef::Agent {
            spark,
            name: remainder.to_string(),
        }),
        _ => {
            let mut sub_parts = remainder.splitn(2, '/');
            let sub_token = sub_parts.next().ok_or_else(|| {
                CoreError::structural("instance ref missing actor/inbox/... segment")
            })?;
            let path = sub_parts.next().unwrap_or_default().to_string();
            let sub = InstanceKind::parse(sub_token).ok_or_else(|| {
                CoreError::structural(format!("unknown instance sub-kind '{sub_token}'"))
            })?;
            Ok(RegistryRef::Instance {
                spark,
                kind: kind.to_string(),
                sub,
                path,
            })
        }
    }
}

/// Normalises a bare name into a schema registry key under `spark`.
pub fn normalise_bare_name(spark: &str, name: &str) -> String {
    format!("{spark}/schema/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_id_requires_prefix() {
        assert!(CoId::parse("co_zabc123").is_ok());
        assert!(CoId::parse("abc123").is_err());
    }

    #[test]
    fn parses_schema_ref() {
        let id = parse_identifier("\u{00B0}Maia/schema/meta").unwrap();
        assert_eq!(
            id,
            Identifier::Registry(RegistryRef::Schema {
                spark: "Maia".into(),
                path: "meta".into(),
            })
        );
    }

    #[test]
    fn parses_instance_ref() {
        let id = parse_identifier("\u{00B0}Maia/todo/actor/123").unwrap();
        match id {
            Identifier::Registry(RegistryRef::Instance { spark, kind, sub, path }) => {
                assert_eq!(spark, "Maia");
                assert_eq!(kind, "todo");
                assert_eq!(sub, InstanceKind::Actor);
                assert_eq!(path, "123");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn bare_name_passes_through() {
        assert_eq!(
            parse_identifier("todo").unwrap(),
            Identifier::BareName("todo".into())
        );
    }
}
