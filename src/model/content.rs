//! Content shapes a CoValue's body can take (§3: Map, List, Stream, Group).
//!
//! Account content reuses [`MapContent`] directly — an account is "itself a
//! map variant" with reserved keys layered on top by higher-level code.

use std::collections::HashMap;

use serde_json::Value;

/// An ordered string-keyed map. Ordering is insertion order, matching how a
/// CRDT map replays its operation log; lookups are linear, which is fine at
/// the key counts a schema-shaped document carries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapContent {
    entries: Vec<(String, Value)>,
}

impl MapContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Sets `key`, overwriting in place if it already exists so ordering is
    /// stable across repeated writes.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        self.entries.len() != before
    }

    /// Deletes every key, leaving the map empty. The CoValue's id survives
    /// a hard delete (§3 Lifecycle) — only its content is cleared.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens to a single JSON object, the shape `CoValueExtractor` returns
    /// for a `Flat` extraction.
    pub fn to_json(&self) -> Value {
        Value::Object(self.entries.iter().cloned().collect())
    }
}

/// An append-only ordered sequence with positional deletes (tombstoned, not
/// compacted — deleting never shifts surviving indices).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListContent {
    items: Vec<Option<Value>>,
}

impl ListContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, value: Value) {
        self.items.push(Some(value));
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn delete(&mut self, index: usize) -> bool {
        match self.items.get_mut(index) {
            Some(slot @ Some(_)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Live (non-tombstoned) items in order.
    pub fn to_json(&self) -> Value {
        Value::Array(self.items.iter().flatten().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A session-partitioned append log: each writer session owns its own
/// ordered run of entries, merged for reads by session id then position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamContent {
    sessions: HashMap<String, Vec<Value>>,
}

impl StreamContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, session: impl Into<String>, value: Value) {
        self.sessions.entry(session.into()).or_default().push(value);
    }

    pub fn session(&self, session: &str) -> Option<&[Value]> {
        self.sessions.get(session).map(Vec::as_slice)
    }

    /// A deterministic merged snapshot, ordered by session id for
    /// reproducibility (the wire CRDT layer may order sessions differently;
    /// this merge is a read-time convenience, not a causal order).
    pub fn to_json(&self) -> Value {
        let mut session_ids: Vec<&String> = self.sessions.keys().collect();
        session_ids.sort();
        let merged: Vec<Value> = session_ids
            .into_iter()
            .flat_map(|id| self.sessions[id].iter().cloned())
            .collect();
        Value::Array(merged)
    }

    pub fn session_ids(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}

/// Permission role a group member or parent-group inclusion carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Reader,
    Writer,
    Admin,
}

/// Group content: direct account members plus parent-group inclusions,
/// backed by a map so arbitrary metadata keys survive alongside membership.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupContent {
    map: MapContent,
    account_members: Vec<(String, GroupRole)>,
    parent_groups: Vec<(String, GroupRole)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupRole(pub Role);

impl PartialEq<Role> for GroupRole {
    fn eq(&self, other: &Role) -> bool {
        self.0 == *other
    }
}

impl GroupContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self) -> &MapContent {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapContent {
        &mut self.map
    }

    pub fn add_member(&mut self, account_id: impl Into<String>, role: Role) {
        let account_id = account_id.into();
        self.account_members.retain(|(id, _)| *id != account_id);
        self.account_members.push((account_id, GroupRole(role)));
    }

    pub fn remove_member(&mut self, account_id: &str) -> bool {
        let before = self.account_members.len();
        self.account_members.retain(|(id, _)| id != account_id);
        self.account_members.len() != before
    }

    pub fn set_role(&mut self, account_id: &str, role: Role) -> bool {
        match self.account_members.iter_mut().find(|(id, _)| id == account_id) {
            Some(entry) => {
                entry.1 = GroupRole(role);
                true
            }
            None => false,
        }
    }

    pub fn member_role(&self, account_id: &str) -> Option<Role> {
        self.account_members
            .iter()
            .find(|(id, _)| id == account_id)
            .map(|(_, role)| role.0)
    }

    pub fn account_members(&self) -> impl Iterator<Item = (&str, Role)> {
        self.account_members.iter().map(|(id, role)| (id.as_str(), role.0))
    }

    pub fn extend_with_group(&mut self, group_id: impl Into<String>, role: Role) {
        self.parent_groups.push((group_id.into(), GroupRole(role)));
    }

    pub fn group_members(&self) -> impl Iterator<Item = (&str, Role)> {
        self.parent_groups.iter().map(|(id, role)| (id.as_str(), role.0))
    }
}

/// The discriminated content payload a [`crate::model::covalue::CoValue`]
/// carries, matching the runtime's `getCurrentContent` result shape.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentVariant {
    Map(MapContent),
    List(ListContent),
    Stream(StreamContent),
    Group(GroupContent),
}

impl ContentVariant {
    pub fn as_map(&self) -> Option<&MapContent> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListContent> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamContent> {
        match self {
            Self::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupContent> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupContent> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapContent> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListContent> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Best-effort JSON snapshot, used by `Flat`/`Normalised` extraction.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Map(m) => m.to_json(),
            Self::List(l) => l.to_json(),
            Self::Stream(s) => s.to_json(),
            Self::Group(g) => g.map().to_json(),
        }
    }
}
