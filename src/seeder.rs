//! [`Seeder`]: bootstraps an account's permission groups, meta-schema,
//! dependency-ordered schema CoValues and registry entries, then
//! rehydrates configs and data (§1 item 5, §6.2).
//!
//! Schema creation order is a hard dependency (§9 Design Notes: "do not
//! parallelise schema creation") — every phase below runs strictly
//! sequentially, mirroring a single-threaded cooperative event loop with
//! no worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::info;

use crate::context::{CallContext, Deadline};
use crate::error::CoreError;
use crate::model::{CoId, ContentVariant, CoValueVariant, Header, MapContent, Ruleset, SchemaRef};
use crate::runtime::CrdtRuntime;
use crate::schema_index::SchemaIndex;
use crate::time::Clock;

/// Registry key suffix for the per-spark meta-schema, under
/// `sparks[name].os.schematas`.
pub const META_SCHEMA_KEY: &str = "schema/meta";

/// One schema to create, in the order it must be created (dependencies
/// before dependents).
#[derive(Clone, Debug)]
pub struct SchemaSpec {
    /// Registry key, e.g. `schema/todo` (without spark name or `°` sigil).
    pub key: String,
    pub cotype: String,
    pub document: Value,
}

/// Bootstrap input: the spark's configs, the schemas to seed (already
/// topologically ordered by the caller — reordering is out of scope here),
/// and any data rows to rehydrate keyed by schema key.
#[derive(Clone, Debug, Default)]
pub struct SeedInput {
    pub spark_name: String,
    pub configs: HashMap<String, Value>,
    pub schemas: Vec<SchemaSpec>,
    pub data: HashMap<String, Vec<Value>>,
}

#[derive(Clone, Debug, Default)]
pub struct SeedReport {
    pub spark_group_id: Option<CoId>,
    pub meta_schema_id: Option<CoId>,
    pub schema_ids: HashMap<String, CoId>,
    pub created_data_ids: HashMap<String, Vec<CoId>>,
}

const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Seeder {
    runtime: Arc<dyn CrdtRuntime>,
    schema_index: Arc<SchemaIndex>,
    clock: Arc<dyn Clock>,
}

impl Seeder {
    pub fn new(runtime: Arc<dyn CrdtRuntime>, schema_index: Arc<SchemaIndex>, clock: Arc<dyn Clock>) -> Self {
        Self { runtime, schema_index, clock }
    }

    fn ctx(&self) -> CallContext {
        CallContext::with_deadline(Deadline::after(DEFAULT_PHASE_TIMEOUT, self.clock.as_ref()))
    }

    /// Runs the full bootstrap pipeline. Idempotent: re-running with the
    /// same `input` against an already-seeded account reaches the same
    /// group, meta-schema and schema ids as a single run (§8 round-trip
    /// laws) because every creation phase first checks the account's
    /// `schematas` registry (and the schema index) for an existing entry
    /// before minting a new CoValue. Data rows are appended each run, not
    /// deduplicated — rehydration is additive by design.
    pub async fn seed(&self, input: &SeedInput) -> Result<SeedReport, CoreError> {
        let mut report = SeedReport::default();

        let spark_group_id = self.ensure_spark_group(&input.spark_name).await?;
        report.spark_group_id = Some(spark_group_id.clone());

        let meta_schema_id = self.ensure_meta_schema(&spark_group_id, &input.spark_name).await?;
        self.register_schemata_entry(&input.spark_name, META_SCHEMA_KEY, &meta_schema_id).await?;
        report.meta_schema_id = Some(meta_schema_id.clone());

        for spec in &input.schemas {
            let schema_id = self
                .ensure_schema(&spark_group_id, &meta_schema_id, &input.spark_name, spec)
                .await?;
            self.register_schemata_entry(&input.spark_name, &spec.key, &schema_id).await?;
            let index_list_id = self.ensure_index_list(&spark_group_id, &meta_schema_id, &schema_id).await?;
            self.schema_index.register(schema_id.clone(), index_list_id);
            report.schema_ids.insert(spec.key.clone(), schema_id);
        }

        for (key, value) in &input.configs {
            info!(spark = %input.spark_name, config = %key, "applying seed config");
            let _ = value;
        }

        for (key, rows) in &input.data {
            let Some(schema_id) = report.schema_ids.get(key).cloned() else {
                return Err(CoreError::schema_missing(format!(
                    "data targets unknown schema key '{key}'"
                )));
            };
            let mut created_ids = Vec::with_capacity(rows.len());
            for row in rows {
                let id = self.rehydrate_row(&spark_group_id, &schema_id, row).await?;
                created_ids.push(id);
            }
            report.created_data_ids.insert(key.clone(), created_ids);
        }

        self.reindex_all(&report).await?;
        Ok(report)
    }

    async fn ensure_spark_group(&self, spark_name: &str) -> Result<CoId, CoreError> {
        let ctx = self.ctx();
        let account = self.runtime.load_co_value_core(self.runtime.account_id(), &ctx).await?;
        let existing = account
            .content()
            .as_map()
            .and_then(|m| m.get("sparks"))
            .and_then(Value::as_object)
            .and_then(|sparks| sparks.get(spark_name))
            .and_then(|record| record.get("group"))
            .and_then(Value::as_str)
            .and_then(|raw| CoId::parse(raw).ok());
        if let Some(group_id) = existing {
            return Ok(group_id);
        }

        let created = self
            .runtime
            .create_co_value(Header::for_group(), CoValueVariant::Group, ContentVariant::Group(Default::default()))
            .await?;
        let group_id = created.id().clone();
        self.persist_spark_group(spark_name, &group_id).await?;
        Ok(group_id)
    }

    /// Writes `sparks[spark_name].group = group_id`, merging into whatever
    /// spark record already exists. Without this, [`Self::ensure_spark_group`]'s
    /// existence check never finds a previously-created group and every
    /// `seed()` re-run mints a fresh one.
    async fn persist_spark_group(&self, spark_name: &str, group_id: &CoId) -> Result<(), CoreError> {
        let ctx = self.ctx();
        let account_id = self.runtime.account_id().clone();
        let account = self.runtime.load_co_value_core(&account_id, &ctx).await?;
        let mut sparks: Map<String, Value> = account
            .content()
            .as_map()
            .and_then(|m| m.get("sparks"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut spark_record: Map<String, Value> = sparks
            .get(spark_name)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        spark_record.insert("group".to_string(), Value::String(group_id.to_string()));
        spark_record.insert("name".to_string(), Value::String(spark_name.to_string()));
        sparks.insert(spark_name.to_string(), Value::Object(spark_record));

        let sparks_value = Value::Object(sparks);
        self.runtime
            .mutate(
                &account_id,
                Box::new(move |content| {
                    if let Some(map) = content.as_map_mut() {
                        map.set("sparks", sparks_value);
                    }
                }),
            )
            .await?;
        Ok(())
    }

    /// Looks up `sparks[spark_name].os.schematas[spark_name/key]` on the
    /// local account, the same place [`Self::register_schemata_entry`]
    /// writes to. Used by every creation phase to decide whether a prior
    /// seed run already minted this CoValue.
    async fn lookup_schemata_entry(&self, spark_name: &str, key: &str) -> Result<Option<CoId>, CoreError> {
        let ctx = self.ctx();
        let account = self.runtime.load_co_value_core(self.runtime.account_id(), &ctx).await?;
        let full_key = format!("{spark_name}/{key}");
        let id = account
            .content()
            .as_map()
            .and_then(|m| m.get("sparks"))
            .and_then(Value::as_object)
            .and_then(|sparks| sparks.get(spark_name))
            .and_then(Value::as_object)
            .and_then(|record| record.get("os"))
            .and_then(Value::as_object)
            .and_then(|os| os.get("schematas"))
            .and_then(Value::as_object)
            .and_then(|schematas| schematas.get(&full_key))
            .and_then(Value::as_str)
            .and_then(|raw| CoId::parse(raw).ok());
        Ok(id)
    }

    async fn ensure_meta_schema(&self, group_id: &CoId, spark_name: &str) -> Result<CoId, CoreError> {
        if let Some(id) = self.lookup_schemata_entry(spark_name, META_SCHEMA_KEY).await? {
            return Ok(id);
        }
        let mut map = MapContent::new();
        map.set("title", Value::String("GenesisSchema".to_string()));
        map.set("cotype", Value::String("comap".to_string()));
        map.set("group", Value::String(group_id.to_string()));
        let header = Header::new(None, Ruleset::Ordinary);
        let created = self.runtime.create_co_value(header, CoValueVariant::Map, ContentVariant::Map(map)).await?;
        Ok(created.id().clone())
    }

    async fn ensure_schema(
        &self,
        group_id: &CoId,
        meta_schema_id: &CoId,
        spark_name: &str,
        spec: &SchemaSpec,
    ) -> Result<CoId, CoreError> {
        if let Some(id) = self.lookup_schemata_entry(spark_name, &spec.key).await? {
            return Ok(id);
        }
        let mut map = MapContent::new();
        if let Value::Object(obj) = &spec.document {
            for (key, value) in obj {
                map.set(key.clone(), value.clone());
            }
        }
        map.set("cotype", Value::String(spec.cotype.clone()));
        map.set("group", Value::String(group_id.to_string()));
        let header = Header::for_schema(SchemaRef::CoValue(meta_schema_id.clone()));
        let created = self.runtime.create_co_value(header, CoValueVariant::Map, ContentVariant::Map(map)).await?;
        Ok(created.id().clone())
    }

    async fn ensure_index_list(&self, group_id: &CoId, meta_schema_id: &CoId, schema_id: &CoId) -> Result<CoId, CoreError> {
        if let Some(existing) = self.schema_index.index_list_for(schema_id) {
            return Ok(existing);
        }
        let index_schema = self.ensure_auto_index_schema(group_id, meta_schema_id).await?;
        let header = Header::for_schema(SchemaRef::CoValue(index_schema));
        let created = self
            .runtime
            .create_co_value(header, CoValueVariant::List, ContentVariant::List(Default::default()))
            .await?;
        Ok(created.id().clone())
    }

    async fn ensure_auto_index_schema(&self, group_id: &CoId, meta_schema_id: &CoId) -> Result<CoId, CoreError> {
        let mut map = MapContent::new();
        map.set("title", Value::String("auto-generated index schema".to_string()));
        map.set("cotype", Value::String("colist".to_string()));
        map.set("group", Value::String(group_id.to_string()));
        let header = Header::for_schema(SchemaRef::CoValue(meta_schema_id.clone()));
        let created = self.runtime.create_co_value(header, CoValueVariant::Map, ContentVariant::Map(map)).await?;
        Ok(created.id().clone())
    }

    /// Writes `spark.os.schematas[key] = schema_id`, merging into whatever
    /// spark record already exists (idempotent — re-seeding overwrites the
    /// same key with the same value).
    async fn register_schemata_entry(&self, spark_name: &str, key: &str, schema_id: &CoId) -> Result<(), CoreError> {
        let ctx = self.ctx();
        let account_id = self.runtime.account_id().clone();
        let account = self.runtime.load_co_value_core(&account_id, &ctx).await?;
        let mut sparks: Map<String, Value> = account
            .content()
            .as_map()
            .and_then(|m| m.get("sparks"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut spark_record: Map<String, Value> = sparks
            .get(spark_name)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut os: Map<String, Value> = spark_record
            .get("os")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut schematas: Map<String, Value> = os
            .get("schematas")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let full_key = format!("{spark_name}/{key}");
        schematas.insert(full_key, Value::String(schema_id.to_string()));
        os.insert("schematas".to_string(), Value::Object(schematas));
        spark_record.insert("os".to_string(), Value::Object(os));
        spark_record.insert("name".to_string(), Value::String(spark_name.to_string()));
        sparks.insert(spark_name.to_string(), Value::Object(spark_record));

        let sparks_value = Value::Object(sparks);
        self.runtime
            .mutate(
                &account_id,
                Box::new(move |content| {
                    if let Some(map) = content.as_map_mut() {
                        map.set("sparks", sparks_value);
                    }
                }),
            )
            .await?;
        Ok(())
    }

    async fn rehydrate_row(&self, group_id: &CoId, schema_id: &CoId, row: &Value) -> Result<CoId, CoreError> {
        let mut map = MapContent::new();
        if let Value::Object(obj) = row {
            for (key, value) in obj {
                map.set(key.clone(), value.clone());
            }
        }
        map.set("group", Value::String(group_id.to_string()));
        let header = Header::for_schema(SchemaRef::CoValue(schema_id.clone()));
        let created = self.runtime.create_co_value(header, CoValueVariant::Map, ContentVariant::Map(map)).await?;
        let ctx = self.ctx();
        self.schema_index.append(schema_id, created.id(), &ctx).await?;
        Ok(created.id().clone())
    }

    /// End-of-seed re-index pass (§4.8): appends every known-seeded id that
    /// is missing from its schema's index list. Appends are idempotent.
    async fn reindex_all(&self, report: &SeedReport) -> Result<(), CoreError> {
        let ctx = self.ctx();
        for (key, schema_id) in &report.schema_ids {
            let known = report.created_data_ids.get(key).cloned().unwrap_or_default();
            self.schema_index.reindex(schema_id, &known, &ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryRuntime;
    use crate::time::MockClock;
    use serde_json::json;

    fn account_id(runtime: &InMemoryRuntime) -> CoId {
        runtime.account_id().clone()
    }

    fn seed_account(runtime: &InMemoryRuntime) {
        let mut value = crate::model::CoValue::unavailable(
            account_id(runtime),
            CoValueVariant::Account,
            crate::model::Header::for_account(),
        );
        value.mark_available(ContentVariant::Map(MapContent::new()));
        runtime.insert(value);
    }

    fn sample_input() -> SeedInput {
        SeedInput {
            spark_name: "Maia".to_string(),
            configs: HashMap::new(),
            schemas: vec![SchemaSpec {
                key: "schema/todo".to_string(),
                cotype: "comap".to_string(),
                document: json!({"properties": {"text": {"type": "string"}}}),
            }],
            data: HashMap::from([("schema/todo".to_string(), vec![json!({"text": "a", "done": false})])]),
        }
    }

    #[test]
    fn seed_creates_group_schema_and_rehydrates_data() {
        let clock = Arc::new(MockClock::new());
        let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
        seed_account(&runtime);
        let schema_index = Arc::new(SchemaIndex::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>));
        let seeder = Seeder::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), clock);

        let report = futures::executor::block_on(seeder.seed(&sample_input())).unwrap();
        assert!(report.spark_group_id.is_some());
        assert!(report.meta_schema_id.is_some());
        assert!(report.schema_ids.contains_key("schema/todo"));
        assert_eq!(report.created_data_ids["schema/todo"].len(), 1);

        let schema_id = &report.schema_ids["schema/todo"];
        let ctx = CallContext::new();
        let snapshot = futures::executor::block_on(schema_index.snapshot(schema_id, &ctx)).unwrap();
        assert_eq!(snapshot, report.created_data_ids["schema/todo"]);
    }

    #[test]
    fn reseeding_reuses_the_same_group_meta_schema_and_schema_ids() {
        let clock = Arc::new(MockClock::new());
        let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
        seed_account(&runtime);
        let schema_index = Arc::new(SchemaIndex::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>));
        let seeder = Seeder::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), clock);

        let input = sample_input();
        let first = futures::executor::block_on(seeder.seed(&input)).unwrap();
        let second = futures::executor::block_on(seeder.seed(&input)).unwrap();

        assert_eq!(first.spark_group_id, second.spark_group_id);
        assert_eq!(first.meta_schema_id, second.meta_schema_id);
        assert_eq!(first.schema_ids, second.schema_ids);

        let schema_id = &first.schema_ids["schema/todo"];
        let ctx = CallContext::new();
        let snapshot = futures::executor::block_on(schema_index.snapshot(schema_id, &ctx)).unwrap();
        // both runs rehydrate their own data row (additive), but the
        // group/meta-schema/schema ids themselves are not duplicated.
        assert_eq!(snapshot.len(), 2);
    }
}
