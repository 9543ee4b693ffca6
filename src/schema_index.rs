//! [`SchemaIndex`]: per-schema append-only membership lists (§4.8).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::CallContext;
use crate::error::CoreError;
use crate::model::{CoId, ContentVariant};
use crate::runtime::CrdtRuntime;

/// Maps schema id → its index list CoValue id. In the real system this
/// lives under `spark.os.indexes`; this type is the in-process cache a
/// `Crud` instance consults so it doesn't re-walk the registry on every
/// create/delete.
pub struct SchemaIndex {
    runtime: Arc<dyn CrdtRuntime>,
    index_lists: Mutex<HashMap<CoId, CoId>>,
}

impl SchemaIndex {
    pub fn new(runtime: Arc<dyn CrdtRuntime>) -> Self {
        Self {
            runtime,
            index_lists: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `list_id` as the index list for `schema_id`, typically
    /// populated once by the seeder or by a lazily-created index.
    pub fn register(&self, schema_id: CoId, list_id: CoId) {
        self.index_lists.lock().expect("schema index lock poisoned").insert(schema_id, list_id);
    }

    pub fn index_list_for(&self, schema_id: &CoId) -> Option<CoId> {
        self.index_lists.lock().expect("schema index lock poisoned").get(schema_id).cloned()
    }

    /// Appends `item_id` to `schema_id`'s index list if it is not already
    /// present. Idempotent: a duplicate append is a no-op.
    pub async fn append(&self, schema_id: &CoId, item_id: &CoId, ctx: &CallContext) -> Result<(), CoreError> {
        let Some(list_id) = self.index_list_for(schema_id) else {
            return Err(CoreError::schema_missing(format!("no index list registered for schema {schema_id}")));
        };
        let list_value = self.runtime.load_co_value_core(&list_id, ctx).await?;
        let already_present = list_value
            .content()
            .as_list()
            .is_some_and(|list| list.to_json().as_array().is_some_and(|items| {
                items.iter().any(|v| v.as_str() == Some(item_id.as_str()))
            }));
        if already_present {
            return Ok(());
        }

        let item_value = serde_json::Value::String(item_id.to_string());
        self.runtime
            .mutate(
                &list_id,
                Box::new(move |content| {
                    if let ContentVariant::List(list) = content {
                        list.append(item_value);
                    }
                }),
            )
            .await?;
        Ok(())
    }

    /// Removes `item_id` from `schema_id`'s index list by its current
    /// position. A missing list or missing item is not an error — §4.7.5
    /// says "proceed anyway".
    pub async fn remove(&self, schema_id: &CoId, item_id: &CoId, ctx: &CallContext) -> Result<(), CoreError> {
        let Some(list_id) = self.index_list_for(schema_id) else {
            return Ok(());
        };
        let list_value = self.runtime.load_co_value_core(&list_id, ctx).await?;
        let Some(list) = list_value.content().as_list() else {
            return Ok(());
        };
        let position = list
            .to_json()
            .as_array()
            .and_then(|items| items.iter().position(|v| v.as_str() == Some(item_id.as_str())));
        let Some(position) = position else {
            return Ok(());
        };
        self.runtime
            .mutate(
                &list_id,
                Box::new(move |content| {
                    if let ContentVariant::List(list) = content {
                        list.delete(position);
                    }
                }),
            )
            .await?;
        Ok(())
    }

    /// Serves the current snapshot of ids for `schema_id`.
    pub async fn snapshot(&self, schema_id: &CoId, ctx: &CallContext) -> Result<Vec<CoId>, CoreError> {
        let Some(list_id) = self.index_list_for(schema_id) else {
            return Ok(Vec::new());
        };
        let list_value = self.runtime.load_co_value_core(&list_id, ctx).await?;
        let items = list_value
            .content()
            .as_list()
            .map(|list| list.to_json())
            .and_then(|json| json.as_array().cloned())
            .unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for item in items {
            if let Some(raw) = item.as_str() {
                if let Ok(id) = CoId::parse(raw) {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Re-index pass: appends every id in `known` that is missing from
    /// `schema_id`'s list. Used at the end of seeding.
    pub async fn reindex(&self, schema_id: &CoId, known: &[CoId], ctx: &CallContext) -> Result<(), CoreError> {
        for id in known {
            self.append(schema_id, id, ctx).await?;
        }
        Ok(())
    }
}
