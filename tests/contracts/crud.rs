//! Contract: end-to-end CRUD against the in-memory runtime — create
//! populates the schema index, update mutates in place, delete clears
//! content and retracts collection membership.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::executor::block_on;
use maia_core::model::ids::parse_identifier;
use maia_core::prelude::*;
use maia_core::test_support::InMemoryRuntime;
use serde_json::json;

/// `read_single` returns a `Loading` store immediately and settles on a
/// background thread; poll rather than assume it's already `Ready`.
fn wait_for_ready(store: &ReactiveStore<ReadOutcome>) -> Flat {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match store.value() {
            ReadOutcome::Ready(flat) => return flat,
            ReadOutcome::Errored { id, error } => panic!("read of {id} errored: {error}"),
            ReadOutcome::Loading { .. } => {
                if Instant::now() >= deadline {
                    panic!("read_single never resolved");
                }
                std::thread::yield_now();
            }
        }
    }
}

fn setup() -> (Arc<InMemoryRuntime>, Arc<SchemaIndex>, Crud, CoId) {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));

    let group_id = runtime.seed_group("co_zdefaultgroup");
    runtime.insert({
        let mut value = CoValue::unavailable(
            runtime.account_id().clone(),
            CoValueVariant::Account,
            Header::for_account(),
        );
        let mut map = MapContent::new();
        map.set("profile", json!({ "group": group_id.as_str() }));
        value.mark_available(ContentVariant::Map(map));
        value
    });

    let schema_id = CoId::parse("co_zTodoSchema").unwrap();
    let list_id = runtime.seed_list("co_zTodoIndex", vec![]);
    let schema_index = Arc::new(SchemaIndex::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>));
    schema_index.register(schema_id.clone(), list_id);

    let crud = Crud::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>, Arc::clone(&schema_index), clock);
    (runtime, schema_index, crud, schema_id)
}

#[test]
fn full_lifecycle_create_update_read_delete() {
    let (_runtime, schema_index, crud, schema_id) = setup();

    let created = block_on(crud.create(&schema_id, Some("comap"), json!({"text": "write tests", "done": false})))
        .expect("create succeeds");
    let created_id = CoId::parse(created.get("id").unwrap().as_str().unwrap()).unwrap();

    let identifier = parse_identifier(created_id.as_str()).unwrap();
    let store = block_on(crud.read_single(&identifier)).unwrap();
    let flat = wait_for_ready(&store);
    assert_eq!(flat.get("text"), Some(&json!("write tests")));

    let mut patch = std::collections::HashMap::new();
    patch.insert("done".to_string(), json!(true));
    let updated = block_on(crud.update(&created_id, &patch)).expect("update succeeds");
    assert_eq!(updated.get("done"), Some(&json!(true)));

    let schema_identifier = parse_identifier(schema_id.as_str()).unwrap();
    let collection = block_on(crud.read_collection(&schema_identifier, None)).unwrap();
    assert_eq!(collection.value().len(), 1);

    let deleted = block_on(crud.delete(&created_id, Some(&schema_id))).expect("delete succeeds");
    assert!(deleted);

    let collection_after = block_on(crud.read_collection(&schema_identifier, None)).unwrap();
    assert!(collection_after.value().is_empty());

    let snapshot = block_on(schema_index.snapshot(&schema_id, &CallContext::new())).unwrap();
    assert!(snapshot.is_empty(), "deleted item must be retracted from the index list");
}

#[test]
fn collection_read_applies_strict_equality_filter() {
    let (_runtime, _schema_index, crud, schema_id) = setup();

    block_on(crud.create(&schema_id, Some("comap"), json!({"text": "a", "done": false}))).unwrap();
    block_on(crud.create(&schema_id, Some("comap"), json!({"text": "b", "done": true}))).unwrap();

    let schema_identifier = parse_identifier(schema_id.as_str()).unwrap();
    let mut filter = Filter::new();
    filter.insert("done".to_string(), json!(true));
    let store = block_on(crud.read_collection(&schema_identifier, Some(&filter))).unwrap();

    let items = store.value();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("text"), Some(&json!("b")));
}

#[test]
fn read_single_on_unresolved_identifier_reports_errored_not_a_timeout() {
    let (_runtime, _schema_index, crud, _schema_id) = setup();
    let identifier = parse_identifier("nonexistent-bare-name").unwrap();
    let store = block_on(crud.read_single(&identifier)).unwrap();
    assert!(matches!(store.value(), ReadOutcome::Errored { .. }));
}
