//! [`SchemaResolver`]: turns human-readable identifiers and `fromCoValue`
//! requests into co-ids, schema documents or reactive stores (§4.6).

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::CallContext;
use crate::error::CoreError;
use crate::model::{CoId, Identifier, RegistryRef};
use crate::runtime::CrdtRuntime;

/// What shape the caller wants `resolve` to hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnType {
    CoId,
    Schema,
}

/// `resolve`'s outcome. `CoValue` stores are intentionally not modelled
/// here — this crate's `resolve` always bottoms out at a co-id or a
/// schema document; wrapping either in a [`crate::store::ReactiveStore`] is
/// `crud`'s job for the single-read path.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    CoId(CoId),
    Schema(Value),
    Missing,
}

#[derive(Clone, Debug)]
pub struct ResolveOptions {
    pub return_type: ReturnType,
    pub spark: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            return_type: ReturnType::CoId,
            spark: None,
        }
    }
}

pub struct SchemaResolver {
    runtime: Arc<dyn CrdtRuntime>,
}

impl SchemaResolver {
    pub fn new(runtime: Arc<dyn CrdtRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn resolve(
        &self,
        identifier: &Identifier,
        options: &ResolveOptions,
        ctx: &CallContext,
    ) -> Result<Resolved, CoreError> {
        let co_id = match identifier {
            Identifier::CoId(id) => id.clone(),
            Identifier::BareName(name) => {
                let spark = self.effective_spark(options)?;
                let key = crate::model::ids::normalise_bare_name(&spark, name);
                match self.walk_schematas(&spark, &key, ctx).await? {
                    Some(id) => id,
                    None => return Ok(Resolved::Missing),
                }
            }
            Identifier::Registry(registry_ref) => {
                let spark = registry_ref.spark().to_string();
                match registry_ref {
                    RegistryRef::Schema { path, .. } => {
                        let key = format!("{spark}/schema/{path}");
                        match self.walk_schematas(&spark, &key, ctx).await? {
                            Some(id) => id,
                            None => return Ok(Resolved::Missing),
                        }
                    }
                    RegistryRef::Agent { name, .. } => {
                        match self.walk_agents(&spark, name, ctx).await? {
                            Some(id) => id,
                            None => return Ok(Resolved::Missing),
                        }
                    }
                    RegistryRef::Instance { kind, sub, path, .. } => {
                        let key = format!("{spark}/{kind}/{}/{path}", instance_kind_token(*sub));
                        match self.walk_schematas(&spark, &key, ctx).await? {
                            Some(id) => id,
                            None => return Ok(Resolved::Missing),
                        }
                    }
                }
            }
        };

        match options.return_type {
            ReturnType::CoId => Ok(Resolved::CoId(co_id)),
            ReturnType::Schema => self.load_schema(&co_id, ctx).await,
        }
    }

    /// Resolves by loading `from` and following its header `$schema`.
    pub async fn resolve_from_co_value(
        &self,
        from: &CoId,
        options: &ResolveOptions,
        ctx: &CallContext,
    ) -> Result<Resolved, CoreError> {
        let value = self.runtime.load_co_value_core(from, ctx).await?;
        let schema = value
            .header()
            .schema()
            .and_then(|schema_ref| schema_ref.as_co_id())
            .cloned();
        let Some(co_id) = schema else {
            return Ok(Resolved::Missing);
        };
        match options.return_type {
            ReturnType::CoId => Ok(Resolved::CoId(co_id)),
            ReturnType::Schema => self.load_schema(&co_id, ctx).await,
        }
    }

    fn effective_spark(&self, options: &ResolveOptions) -> Result<String, CoreError> {
        if let Some(spark) = &options.spark {
            return Ok(spark.clone());
        }
        Ok(self.runtime.system_spark().to_string())
    }

    /// Walks `account → registries → sparks → <spark> → os → schematas`,
    /// then looks up `key`. Each hop is a single-item load with its own
    /// availability wait; a missing key at any hop is a non-fatal `None`.
    async fn walk_schematas(&self, spark: &str, key: &str, ctx: &CallContext) -> Result<Option<CoId>, CoreError> {
        let registry = self.load_spark_registry(spark, "schematas", ctx).await?;
        Ok(lookup_co_id(registry.as_ref(), key))
    }

    async fn walk_agents(&self, spark: &str, key: &str, ctx: &CallContext) -> Result<Option<CoId>, CoreError> {
        let registry = self.load_spark_registry(spark, "agents", ctx).await?;
        Ok(lookup_co_id(registry.as_ref(), key))
    }

    async fn load_spark_registry(
        &self,
        spark: &str,
        registry_name: &str,
        ctx: &CallContext,
    ) -> Result<Option<Map<String, Value>>, CoreError> {
        let account = self.runtime.load_co_value_core(self.runtime.account_id(), ctx).await?;
        let registries = account
            .content()
            .as_map()
            .and_then(|m| m.get("registries"))
            .and_then(Value::as_object)
            .and_then(|r| r.get("sparks"))
            .and_then(Value::as_object);
        let Some(spark_record_id) = registries.and_then(|r| r.get(spark)).and_then(Value::as_str) else {
            return Ok(None);
        };
        let spark_record_id = CoId::parse(spark_record_id)?;
        let spark_record = self.runtime.load_co_value_core(&spark_record_id, ctx).await?;
        let registry = spark_record
            .content()
            .as_map()
            .and_then(|m| m.get("os"))
            .and_then(Value::as_object)
            .and_then(|os| os.get(registry_name))
            .and_then(Value::as_object)
            .cloned();
        Ok(registry)
    }

    /// Loads `co_id` as a schema document, applying the legacy-wrapper and
    /// `$id`/`$schema` rewriting rules from §4.6.
    async fn load_schema(&self, co_id: &CoId, ctx: &CallContext) -> Result<Resolved, CoreError> {
        let value = self.runtime.load_co_value_core(co_id, ctx).await?;
        let Some(map) = value.content().as_map() else {
            return Err(CoreError::schema_missing(format!("{co_id} is not a map-shaped schema")));
        };

        let mut doc = if let Some(Value::Object(inner)) = map.get("definition") {
            inner.clone()
        } else {
            map.to_json().as_object().cloned().unwrap_or_default()
        };
        doc.remove("id");
        doc.remove("type");
        doc.remove("definition");
        strip_stray_ids(&mut doc);
        doc.insert("$id".to_string(), Value::String(co_id.to_string()));
        if !doc.contains_key("$schema") {
            if let Some(outer_schema) = value.header().schema() {
                doc.insert("$schema".to_string(), Value::String(outer_schema.to_string()));
            }
        }
        Ok(Resolved::Schema(Value::Object(doc)))
    }
}

fn instance_kind_token(kind: crate::model::InstanceKind) -> &'static str {
    match kind {
        crate::model::InstanceKind::Actor => "actor",
        crate::model::InstanceKind::Inbox => "inbox",
        crate::model::InstanceKind::View => "view",
        crate::model::InstanceKind::Context => "context",
        crate::model::InstanceKind::State => "state",
        crate::model::InstanceKind::Style => "style",
    }
}

fn lookup_co_id(registry: Option<&Map<String, Value>>, key: &str) -> Option<CoId> {
    registry
        .and_then(|r| r.get(key))
        .and_then(Value::as_str)
        .and_then(|raw| CoId::parse(raw).ok())
}

/// Recursively removes stray `id` fields, except when nested under a
/// `properties` or `items` key (where `id` is a legitimate field name, not
/// a JSON-Schema self-reference).
fn strip_stray_ids(value: &mut Map<String, Value>) {
    let protected_keys = ["properties", "items"];
    let keys: Vec<String> = value.keys().cloned().collect();
    for key in keys {
        if protected_keys.contains(&key.as_str()) {
            continue;
        }
        if let Some(Value::Object(nested)) = value.get_mut(&key) {
            nested.remove("id");
            strip_stray_ids(nested);
        }
    }
}
