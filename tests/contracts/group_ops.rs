//! Contract: `GroupOps` discovers a CoValue's owning group through both a
//! direct group reference and self-ownership, and membership mutations are
//! immediately visible on the next `discover`.

use std::sync::Arc;

use futures::executor::block_on;
use maia_core::prelude::*;
use maia_core::test_support::InMemoryRuntime;
use serde_json::json;

#[test]
fn discover_follows_a_map_s_group_reference() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let group_id = runtime.seed_group("co_zteamgroup");
    let ops = GroupOps::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>);

    block_on(ops.add_member(&group_id, "co_zalice", Role::Writer)).unwrap();

    let item_id = runtime.seed_available_map("co_zitem1", vec![("group", json!(group_id.as_str()))]);
    let item_value = runtime.get_co_value(&item_id).unwrap();
    let ctx = CallContext::new();

    let info = block_on(ops.discover(&item_value, &ctx)).unwrap();
    assert_eq!(info.group_id, group_id);
    assert!(info.account_members.iter().any(|(id, role)| id == "co_zalice" && *role == Role::Writer));
}

#[test]
fn set_role_on_unknown_member_adds_them() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let group_id = runtime.seed_group("co_zteamgroup2");
    let ops = GroupOps::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>);

    block_on(ops.set_role(&group_id, "co_zbob", Role::Admin)).unwrap();

    let value = runtime.get_co_value(&group_id).unwrap();
    assert_eq!(value.content().as_group().unwrap().member_role("co_zbob"), Some(Role::Admin));
}

#[test]
fn everyone_role_is_surfaced_in_account_members() {
    let clock = Arc::new(MockClock::new());
    let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
    let group_id = runtime.seed_group("co_zpublicgroup");
    let ops = GroupOps::new(Arc::clone(&runtime) as Arc<dyn CrdtRuntime>);

    block_on(ops.add_member(&group_id, "everyone", Role::Reader)).unwrap();

    let value = runtime.get_co_value(&group_id).unwrap();
    let ctx = CallContext::new();
    let info = block_on(ops.discover(&value, &ctx)).unwrap();
    assert!(info.account_members.iter().any(|(id, role)| id == "everyone" && *role == Role::Reader));
}
