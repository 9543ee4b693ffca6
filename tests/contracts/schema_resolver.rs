//! Contract: registry-ref resolution walks account → spark record → os →
//! schematas, and schema-document loading strips the legacy wrapper while
//! stamping `$id`.

use std::sync::Arc;

use futures::executor::block_on;
use maia_core::model::ids::parse_identifier;
use maia_core::prelude::*;
use maia_core::test_support::InMemoryRuntime;
use serde_json::json;

fn runtime_with_registry() -> (Arc<InMemoryRuntime>, CoId) {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));

    let schema_id = runtime.seed_available_map(
        "co_zTodoSchemaDoc",
        vec![(
            "definition",
            json!({ "id": "junk", "properties": { "text": { "type": "string" } } }),
        )],
    );

    let spark_record_id = runtime.seed_available_map(
        "co_zMaiaSparkRecord",
        vec![("os", json!({ "schematas": { "Maia/schema/todo": schema_id.as_str() } }))],
    );

    runtime.insert({
        let mut value = CoValue::unavailable(
            runtime.account_id().clone(),
            CoValueVariant::Account,
            Header::for_account(),
        );
        let mut map = MapContent::new();
        map.set("registries", json!({ "sparks": { "Maia": spark_record_id.as_str() } }));
        value.mark_available(ContentVariant::Map(map));
        value
    });

    (runtime, schema_id)
}

#[test]
fn registry_ref_resolves_to_co_id() {
    let (runtime, schema_id) = runtime_with_registry();
    let resolver = SchemaResolver::new(runtime);
    let identifier = parse_identifier("\u{00B0}Maia/schema/todo").unwrap();
    let ctx = CallContext::new();

    let resolved = block_on(resolver.resolve(&identifier, &ResolveOptions::default(), &ctx)).unwrap();
    assert_eq!(resolved, Resolved::CoId(schema_id));
}

#[test]
fn schema_return_type_unwraps_legacy_definition_and_stamps_id() {
    let (runtime, schema_id) = runtime_with_registry();
    let resolver = SchemaResolver::new(runtime);
    let identifier = parse_identifier("\u{00B0}Maia/schema/todo").unwrap();
    let ctx = CallContext::new();

    let options = ResolveOptions {
        return_type: ReturnType::Schema,
        spark: None,
    };
    let resolved = block_on(resolver.resolve(&identifier, &options, &ctx)).unwrap();
    let Resolved::Schema(doc) = resolved else {
        panic!("expected a schema document");
    };
    assert_eq!(doc.get("$id"), Some(&json!(schema_id.as_str())));
    assert!(doc.get("id").is_none(), "legacy 'id' field must be stripped");
    assert!(doc.get("properties").is_some());
}
