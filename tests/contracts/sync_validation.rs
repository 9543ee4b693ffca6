//! Contract: `SyncValidationHook` allows group/account/profile targets
//! unconditionally, rejects missing or unresolvable schemas, and defers to
//! the injected `SchemaValidator` once a schema document is in hand.

use std::sync::Arc;

use futures::executor::block_on;
use maia_core::prelude::*;
use maia_core::sync_validation::IncomingHeader;
use maia_core::test_support::InMemoryRuntime;
use serde_json::{json, Value};

struct RejectEverything;

impl SchemaValidator for RejectEverything {
    fn validate(&self, _document: &Value, _schema: &Value) -> Result<(), String> {
        Err("no field may ever pass".to_string())
    }
}

fn header(schema: Option<&str>) -> IncomingHeader {
    IncomingHeader {
        schema: schema.map(str::to_string),
        is_group: false,
        is_account: false,
        is_profile: false,
    }
}

#[test]
fn materialised_target_failing_validation_is_rejected_with_validation_kind() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let schema_id = runtime.seed_available_map("co_zTodoSchemaV", vec![("cotype", json!("comap"))]);
    let target_id = runtime.seed_available_map("co_zTodoItem1", vec![("text", json!("hi"))]);

    let hook = SyncValidationHook::new(
        Arc::clone(&runtime) as Arc<dyn CrdtRuntime>,
        Arc::new(RejectEverything),
        clock,
    );

    let decision = block_on(hook.check(&target_id, &header(Some(schema_id.as_str()))));
    assert_eq!(
        decision,
        Decision::RejectWith(ErrorKind::Validation, "no field may ever pass".to_string())
    );
}

#[test]
fn unresolvable_schema_id_is_rejected_as_schema_missing() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let target_id = CoId::parse("co_zorphan").unwrap();

    let hook = SyncValidationHook::new(
        Arc::clone(&runtime) as Arc<dyn CrdtRuntime>,
        Arc::new(AllowAllValidator),
        clock,
    );

    let missing_schema_id = CoId::parse("co_zNeverSeeded").unwrap();
    let decision = block_on(hook.check(&target_id, &header(Some(missing_schema_id.as_str()))));
    assert_eq!(
        decision,
        Decision::RejectWith(ErrorKind::SchemaMissing, format!("schema {missing_schema_id} not found"))
    );
}

#[test]
fn profile_header_bypasses_schema_resolution_entirely() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let hook = SyncValidationHook::new(
        Arc::clone(&runtime) as Arc<dyn CrdtRuntime>,
        Arc::new(RejectEverything),
        clock,
    );
    let target_id = CoId::parse("co_zprofile1").unwrap();
    let header = IncomingHeader {
        schema: None,
        is_group: false,
        is_account: false,
        is_profile: true,
    };
    let decision = block_on(hook.check(&target_id, &header));
    assert!(decision.is_allowed());
}
