//! [`CoValueExtractor`]: converts a materialised [`CoValue`] into the flat,
//! schema-tagged shape the operation API hands back (§4.3).

use serde_json::Value;

use crate::model::header::{SCHEMA_ACCOUNT, SCHEMA_GROUP};
use crate::model::{CoValue, CoValueVariant};

/// `type` tag the flat extraction always carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoType {
    Map,
    List,
    Stream,
    Unknown,
}

impl CoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Map => "comap",
            Self::List => "colist",
            Self::Stream => "costream",
            Self::Unknown => "unknown",
        }
    }
}

/// A hint the caller can pass to force the extractor's `$schema` tag to one
/// of the reserved strings, overriding what the header would otherwise say.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaHint {
    None,
    Account,
    Group,
}

/// The flat extraction: every map key copied to the top level alongside
/// `id`, `type` and `$schema`; lists/streams populate `items` instead.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flat {
    pub fields: Vec<(String, Value)>,
}

impl Flat {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.iter().cloned().collect())
    }
}

/// Tag inferred for a normalised property's value, used only by the
/// diagnostic extraction path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyTag {
    CoId,
    Key,
    Sealed,
    Null,
    Object,
    Array,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Value,
    pub tag: PropertyTag,
}

/// The normalised extraction: `properties` as `{key, value, type}` triples.
/// Used only by diagnostic/inspection surfaces, never the hot CRUD path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalised {
    pub id: String,
    pub schema: Option<String>,
    pub properties: Vec<Property>,
}

/// Extracts the flat representation from `value`. A per-key extraction
/// failure (none occur for in-memory `serde_json::Value`s, but the
/// signature matches a runtime whose `get` may fail) never aborts
/// extraction of sibling keys — callers who need that resilience should
/// catch at the call site and substitute a `Value::Null` placeholder.
pub fn extract_flat(value: &CoValue, hint: SchemaHint) -> Flat {
    let mut flat = Flat::default();
    flat.push("id", Value::String(value.id().to_string()));

    let (cotype, schema_tag) = match value.content() {
        crate::model::ContentVariant::Map(map) => {
            for key in map.keys() {
                if let Some(v) = map.get(key) {
                    flat.push(key, v.clone());
                }
            }
            (CoType::Map, schema_tag(value, hint))
        }
        crate::model::ContentVariant::Group(group) => {
            for key in group.map().keys() {
                if let Some(v) = group.map().get(key) {
                    flat.push(key, v.clone());
                }
            }
            (CoType::Map, Some(SCHEMA_GROUP.to_string()))
        }
        crate::model::ContentVariant::List(list) => {
            flat.push("items", list.to_json());
            (CoType::List, schema_tag(value, hint))
        }
        crate::model::ContentVariant::Stream(stream) => {
            flat.push("items", stream.to_json());
            (CoType::Stream, schema_tag(value, hint))
        }
    };

    flat.push("type", Value::String(cotype.as_str().to_string()));
    if let Some(schema) = schema_tag {
        flat.push("$schema", Value::String(schema));
    }
    flat
}

fn schema_tag(value: &CoValue, hint: SchemaHint) -> Option<String> {
    match hint {
        SchemaHint::Account => return Some(SCHEMA_ACCOUNT.to_string()),
        SchemaHint::Group => return Some(SCHEMA_GROUP.to_string()),
        SchemaHint::None => {}
    }
    if value.variant() == CoValueVariant::Account {
        return Some(SCHEMA_ACCOUNT.to_string());
    }
    if value.header().is_group() {
        return Some(SCHEMA_GROUP.to_string());
    }
    value.header().schema().map(|s| s.to_string())
}

/// Infers a [`PropertyTag`] for a normalised-extraction value.
fn infer_tag(value: &Value) -> PropertyTag {
    match value {
        Value::Null => PropertyTag::Null,
        Value::Object(_) => PropertyTag::Object,
        Value::Array(_) => PropertyTag::Array,
        Value::String(s) if s.starts_with("co_z") => PropertyTag::CoId,
        Value::String(s) if s.starts_with("sealed_") => PropertyTag::Sealed,
        _ => PropertyTag::Key,
    }
}

/// Produces the normalised, diagnostic-only extraction.
pub fn extract_normalised(value: &CoValue, hint: SchemaHint) -> Normalised {
    let schema = schema_tag(value, hint);
    let properties = match value.content() {
        crate::model::ContentVariant::Map(map) => map
            .keys()
            .filter_map(|key| {
                map.get(key).map(|v| Property {
                    key: key.to_string(),
                    value: v.clone(),
                    tag: infer_tag(v),
                })
            })
            .collect(),
        crate::model::ContentVariant::Group(group) => group
            .map()
            .keys()
            .filter_map(|key| {
                group.map().get(key).map(|v| Property {
                    key: key.to_string(),
                    value: v.clone(),
                    tag: infer_tag(v),
                })
            })
            .collect(),
        crate::model::ContentVariant::List(list) => vec![Property {
            key: "items".to_string(),
            value: list.to_json(),
            tag: PropertyTag::Array,
        }],
        crate::model::ContentVariant::Stream(stream) => vec![Property {
            key: "items".to_string(),
            value: stream.to_json(),
            tag: PropertyTag::Array,
        }],
    };
    Normalised {
        id: value.id().to_string(),
        schema,
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CoId, Header, MapContent, SchemaRef};

    fn sample_map_covalue() -> CoValue {
        let mut map = MapContent::new();
        map.set("text", Value::from("a"));
        map.set("done", Value::from(false));
        let header = Header::for_schema(SchemaRef::CoValue(CoId::parse("co_zSchema1").unwrap()));
        let mut value = CoValue::unavailable(
            CoId::parse("co_zitem1").unwrap(),
            CoValueVariant::Map,
            header,
        );
        value.mark_available(crate::model::ContentVariant::Map(map));
        value
    }

    #[test]
    fn flat_extraction_copies_map_keys_and_tags_schema() {
        let value = sample_map_covalue();
        let flat = extract_flat(&value, SchemaHint::None);
        assert_eq!(flat.get("text"), Some(&Value::from("a")));
        assert_eq!(flat.get("type"), Some(&Value::from("comap")));
        assert_eq!(flat.get("$schema"), Some(&Value::from("co_zSchema1")));
    }

    #[test]
    fn flat_extraction_honours_account_hint() {
        let value = sample_map_covalue();
        let flat = extract_flat(&value, SchemaHint::Account);
        assert_eq!(flat.get("$schema"), Some(&Value::from("@account")));
    }

    #[test]
    fn normalised_extraction_infers_coid_tag() {
        let mut map = MapContent::new();
        map.set("owner", Value::from("co_zowner1"));
        let header = Header::for_schema(SchemaRef::CoValue(CoId::parse("co_zSchema1").unwrap()));
        let mut value =
            CoValue::unavailable(CoId::parse("co_zitem1").unwrap(), CoValueVariant::Map, header);
        value.mark_available(crate::model::ContentVariant::Map(map));

        let normalised = extract_normalised(&value, SchemaHint::None);
        let owner = normalised.properties.iter().find(|p| p.key == "owner").unwrap();
        assert_eq!(owner.tag, PropertyTag::CoId);
    }
}
