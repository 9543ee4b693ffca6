//! [`GroupOps`]: discovers, reads and mutates permission groups (§4.5).

use std::sync::Arc;

use serde_json::Value;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::model::content::Role;
use crate::model::{CoId, CoValue, ContentVariant};
use crate::runtime::CrdtRuntime;

pub const EVERYONE: &str = "everyone";

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "admin" | "manager" => Some(Role::Admin),
        "writer" | "extend" => Some(Role::Writer),
        "reader" => Some(Role::Reader),
        "revoked" => None,
        _ => None,
    }
}

/// The result of discovering a CoValue's owning group and its resolved
/// membership.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupInfo {
    pub group_id: CoId,
    pub account_members: Vec<(String, Role)>,
    pub group_members: Vec<(String, Role)>,
}

pub struct GroupOps {
    runtime: Arc<dyn CrdtRuntime>,
}

impl GroupOps {
    pub fn new(runtime: Arc<dyn CrdtRuntime>) -> Self {
        Self { runtime }
    }

    /// Discovers the owning group of `value` and enumerates its members.
    /// If `value` IS a group (ruleset-tagged), it owns itself.
    pub async fn discover(&self, value: &CoValue, ctx: &CallContext) -> Result<GroupInfo, CoreError> {
        if value.header().is_group() {
            return self.read_group(value.id(), value);
        }

        let group_ref = match value.content() {
            ContentVariant::Map(map) => map.get("group").cloned(),
            ContentVariant::Group(_) => None,
            ContentVariant::List(_) | ContentVariant::Stream(_) => None,
        };
        let group_id = match group_ref {
            Some(Value::String(s)) => CoId::parse(s)?,
            Some(Value::Object(obj)) => {
                let raw = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::structural("group reference object missing 'id'"))?;
                CoId::parse(raw)?
            }
            _ => {
                return Err(CoreError::structural(format!(
                    "CoValue {} carries no group reference",
                    value.id()
                )))
            }
        };

        let group_value = self
            .runtime
            .load_co_value_core(&group_id, ctx)
            .await?;
        if !group_value.header().is_group() {
            return Err(CoreError::structural(format!(
                "referenced CoValue {group_id} is not a group"
            )));
        }
        self.read_group(&group_id, &group_value)
    }

    fn read_group(&self, group_id: &CoId, group_value: &CoValue) -> Result<GroupInfo, CoreError> {
        let group = group_value
            .content()
            .as_group()
            .ok_or_else(|| CoreError::structural(format!("{group_id} has no group content")))?;

        let mut account_members: Vec<(String, Role)> = group
            .account_members()
            .map(|(id, role)| (id.to_string(), role))
            .collect();

        if !account_members.iter().any(|(id, _)| id == EVERYONE) {
            if let Some(role) = group.member_role(EVERYONE) {
                account_members.push((EVERYONE.to_string(), role));
            } else if let Some(Value::String(role_raw)) = group.map().get(EVERYONE) {
                if let Some(role) = parse_role(role_raw) {
                    account_members.push((EVERYONE.to_string(), role));
                }
            }
        }

        let group_members: Vec<(String, Role)> = group
            .group_members()
            .map(|(id, role)| (id.to_string(), role))
            .collect();

        Ok(GroupInfo {
            group_id: group_id.clone(),
            account_members,
            group_members,
        })
    }

    /// Adds `member_id` with `role`. A real runtime needs the member's
    /// agent reference rather than a bare id string and falls back to
    /// dereferencing the member's core on a failed direct add; this
    /// in-process model treats the id itself as the reference, so the
    /// fallback has nothing to do here.
    pub async fn add_member(&self, group_id: &CoId, member_id: &str, role: Role) -> Result<(), CoreError> {
        let member_id = member_id.to_string();
        self.runtime
            .mutate(
                group_id,
                Box::new(move |content| {
                    if let Some(group) = content.as_group_mut() {
                        group.add_member(member_id, role);
                    }
                }),
            )
            .await
            .map(|_| ())
    }

    pub async fn remove_member(&self, group_id: &CoId, member_id: &str) -> Result<(), CoreError> {
        let member_id = member_id.to_string();
        self.runtime
            .mutate(
                group_id,
                Box::new(move |content| {
                    if let Some(group) = content.as_group_mut() {
                        group.remove_member(&member_id);
                    }
                }),
            )
            .await
            .map(|_| ())
    }

    /// Sets a member's role, falling back to remove-then-re-add if a direct
    /// role update is not possible (always possible in this in-process
    /// model; the fallback path exists for parity with runtimes that only
    /// support revoke-and-reinvite).
    pub async fn set_role(&self, group_id: &CoId, member_id: &str, role: Role) -> Result<(), CoreError> {
        let member_for_set = member_id.to_string();
        let result = self
            .runtime
            .mutate(
                group_id,
                Box::new(move |content| {
                    if let Some(group) = content.as_group_mut() {
                        if !group.set_role(&member_for_set, role) {
                            group.add_member(member_for_set, role);
                        }
                    }
                }),
            )
            .await;
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallContext;
    use crate::test_support::InMemoryRuntime;
    use crate::time::MockClock;
    use std::sync::Arc;

    #[test]
    fn discover_self_when_value_is_a_group() {
        let clock = Arc::new(MockClock::new());
        let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
        let group_id = runtime.seed_group("co_zgroup1");
        let ops = GroupOps::new(runtime.clone());
        futures::executor::block_on(ops.add_member(&group_id, "co_zacct1", Role::Writer)).unwrap();

        let value = runtime.get_co_value(&group_id).unwrap();
        let ctx = CallContext::new();
        let info = futures::executor::block_on(ops.discover(&value, &ctx)).unwrap();
        assert_eq!(info.group_id, group_id);
        assert!(info
            .account_members
            .iter()
            .any(|(id, role)| id == "co_zacct1" && *role == Role::Writer));
    }

    #[test]
    fn add_remove_and_set_role_round_trip() {
        let clock = Arc::new(MockClock::new());
        let runtime = Arc::new(InMemoryRuntime::new(Arc::clone(&clock)));
        let group_id = runtime.seed_group("co_zgroup1");
        let ops = GroupOps::new(runtime.clone());

        futures::executor::block_on(ops.add_member(&group_id, "co_zacct1", Role::Reader)).unwrap();
        let value = runtime.get_co_value(&group_id).unwrap();
        assert_eq!(
            value.content().as_group().unwrap().member_role("co_zacct1"),
            Some(Role::Reader)
        );

        futures::executor::block_on(ops.set_role(&group_id, "co_zacct1", Role::Admin)).unwrap();
        let value = runtime.get_co_value(&group_id).unwrap();
        assert_eq!(
            value.content().as_group().unwrap().member_role("co_zacct1"),
            Some(Role::Admin)
        );

        futures::executor::block_on(ops.remove_member(&group_id, "co_zacct1")).unwrap();
        let value = runtime.get_co_value(&group_id).unwrap();
        assert_eq!(value.content().as_group().unwrap().member_role("co_zacct1"), None);
    }
}
