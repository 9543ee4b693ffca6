//! Contract: `Seeder::seed` bootstraps a spark end-to-end and is
//! idempotent across re-runs for everything but data rehydration.

use std::collections::HashMap;
use std::sync::Arc;

use futures::executor::block_on;
use maia_core::model::ContentVariant;
use maia_core::prelude::*;
use maia_core::test_support::InMemoryRuntime;
use serde_json::json;

fn seed_account(runtime: &InMemoryRuntime) {
    let mut value = CoValue::unavailable(
        runtime.account_id().clone(),
        CoValueVariant::Account,
        Header::for_account(),
    );
    value.mark_available(ContentVariant::Map(MapContent::new()));
    runtime.insert(value);
}

fn sample_input() -> SeedInput {
    SeedInput {
        spark_name: "Maia".to_string(),
        configs: HashMap::from([("theme".to_string(), json!("dark"))]),
        schemas: vec![SchemaSpec {
            key: "schema/todo".to_string(),
            cotype: "comap".to_string(),
            document: json!({"properties": {"text": {"type": "string"}}}),
        }],
        data: HashMap::from([("schema/todo".to_string(), vec![json!({"text": "seed row", "done": false})])]),
    }
}

#[test]
fn seed_then_crud_read_sees_the_rehydrated_row() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    seed_account(&runtime);

    let schema_index = Arc::new(SchemaIndex::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>));
    let seeder = Seeder::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), Arc::clone(&clock));
    let report = block_on(seeder.seed(&sample_input())).expect("seed succeeds");

    let schema_id = report.schema_ids.get("schema/todo").expect("schema was created").clone();

    // Point the account's default group at the spark group so Crud::create
    // can resolve it, mirroring how a real account wires profile.group.
    let group_id = report.spark_group_id.clone().unwrap();
    let account_id = runtime.account_id().clone();
    block_on(runtime.mutate(
        &account_id,
        Box::new(move |content| {
            if let Some(map) = content.as_map_mut() {
                map.set("profile", json!({ "group": group_id.as_str() }));
            }
        }),
    ))
    .unwrap();

    let crud = Crud::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), clock);
    let schema_identifier = maia_core::model::ids::parse_identifier(schema_id.as_str()).unwrap();
    let collection = block_on(crud.read_collection(&schema_identifier, None)).unwrap();
    assert_eq!(collection.value().len(), 1);
    assert_eq!(collection.value()[0].get("text"), Some(&json!("seed row")));
}

#[test]
fn reseeding_does_not_duplicate_the_group_or_schemas() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    seed_account(&runtime);

    let schema_index = Arc::new(SchemaIndex::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>));
    let seeder = Seeder::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), clock);

    let input = sample_input();
    let first = block_on(seeder.seed(&input)).unwrap();
    let second = block_on(seeder.seed(&input)).unwrap();

    assert_eq!(first.spark_group_id, second.spark_group_id);
    assert_eq!(first.meta_schema_id, second.meta_schema_id);
    assert_eq!(first.schema_ids, second.schema_ids);
}
