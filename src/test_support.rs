//! An in-memory [`CrdtRuntime`] test double. Exercises every component in
//! this crate without a real CRDT transport.
//!
//! Available to this crate's own unit tests unconditionally; exposed to
//! downstream integration tests (`tests/contracts/*`) behind the
//! `test-support` feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::model::{CoId, CoValue, CoValueVariant, ContentVariant, Header, MapContent, SchemaRef};
use crate::runtime::{CrdtRuntime, LocalIdentity};
use crate::subscription_cache::Subscription;
use crate::time::Clock;

/// A registered `subscribe` callback.
type Listener = Arc<dyn Fn() + Send + Sync>;

struct State {
    store: HashMap<CoId, CoValue>,
    pending: HashMap<CoId, Instant>,
    next_seq: u64,
}

pub struct InMemoryRuntime {
    clock: Arc<dyn Clock>,
    account_id: CoId,
    system_spark: String,
    state: Mutex<State>,
    listeners: Arc<Mutex<HashMap<CoId, Vec<(u64, Listener)>>>>,
    next_listener_id: Mutex<u64>,
}

struct InMemorySubscription {
    listeners: Arc<Mutex<HashMap<CoId, Vec<(u64, Listener)>>>>,
    id: CoId,
    listener_id: u64,
}

impl Subscription for InMemorySubscription {
    fn unsubscribe(&mut self) {
        let mut listeners = self.listeners.lock().expect("runtime listeners lock poisoned");
        if let Some(entries) = listeners.get_mut(&self.id) {
            entries.retain(|(id, _)| *id != self.listener_id);
        }
    }
}

impl InMemoryRuntime {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_identity(clock, "co_zaccount0", "Maia")
    }

    pub fn with_identity(clock: Arc<dyn Clock>, account_id: &str, system_spark: &str) -> Self {
        Self {
            clock,
            account_id: CoId::parse(account_id).expect("valid test account id"),
            system_spark: system_spark.to_string(),
            state: Mutex::new(State {
                store: HashMap::new(),
                pending: HashMap::new(),
                next_seq: 0,
            }),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: Mutex::new(0),
        }
    }

    /// Invokes every listener registered for `id` via `subscribe`, outside
    /// the `listeners` lock so a listener that itself subscribes/unsubscribes
    /// doesn't deadlock on this runtime's own listener mutex.
    fn notify(&self, id: &CoId) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().expect("runtime listeners lock poisoned");
            listeners.get(id).map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect()).unwrap_or_default()
        };
        for listener in &snapshot {
            listener();
        }
    }

    /// Inserts an already-materialised CoValue, overwriting any existing
    /// entry at the same id.
    pub fn insert(&self, value: CoValue) {
        let mut state = self.state.lock().expect("runtime state lock poisoned");
        state.store.insert(value.id().clone(), value);
    }

    pub fn seed_available_map(&self, id: &str, fields: Vec<(&str, Value)>) -> CoId {
        let mut map = MapContent::new();
        for (key, value) in fields {
            map.set(key, value);
        }
        let co_id = CoId::parse(id).expect("valid test co-id");
        let header = Header::for_schema(SchemaRef::CoValue(
            CoId::parse("co_zTestSchema").expect("valid test schema id"),
        ));
        let mut value = CoValue::unavailable(co_id.clone(), CoValueVariant::Map, header);
        value.mark_available(ContentVariant::Map(map));
        self.insert(value);
        co_id
    }

    pub fn seed_pending_map(&self, id: &str) -> CoId {
        let co_id = CoId::parse(id).expect("valid test co-id");
        let header = Header::for_schema(SchemaRef::CoValue(
            CoId::parse("co_zTestSchema").expect("valid test schema id"),
        ));
        let value = CoValue::unavailable(co_id.clone(), CoValueVariant::Map, header);
        self.insert(value);
        co_id
    }

    pub fn seed_group(&self, id: &str) -> CoId {
        let co_id = CoId::parse(id).expect("valid test co-id");
        let mut value = CoValue::unavailable(co_id.clone(), CoValueVariant::Group, Header::for_group());
        value.mark_available(ContentVariant::Group(Default::default()));
        self.insert(value);
        co_id
    }

    pub fn seed_list(&self, id: &str, items: Vec<Value>) -> CoId {
        let co_id = CoId::parse(id).expect("valid test co-id");
        let header = Header::for_schema(SchemaRef::CoValue(
            CoId::parse("co_zTestSchema").expect("valid test schema id"),
        ));
        let mut list = crate::model::ListContent::new();
        for item in items {
            list.append(item);
        }
        let mut value = CoValue::unavailable(co_id.clone(), CoValueVariant::List, header);
        value.mark_available(ContentVariant::List(list));
        self.insert(value);
        co_id
    }

    /// Marks a previously-seeded-pending CoValue as becoming available
    /// `delay` from now; it is promoted lazily, the next time anything
    /// observes it.
    pub fn resolve_pending_after(&self, id: &CoId, delay: Duration) {
        let ready_at = self.clock.now() + delay;
        let mut state = self.state.lock().expect("runtime state lock poisoned");
        state.pending.insert(id.clone(), ready_at);
    }

    fn promote_if_ready(&self, state: &mut State, id: &CoId) {
        let Some(ready_at) = state.pending.get(id).copied() else {
            return;
        };
        if self.clock.now() < ready_at {
            return;
        }
        if let Some(value) = state.store.get_mut(id) {
            if !value.is_available() {
                let content = value.content().clone();
                value.mark_available(content);
            }
        }
        state.pending.remove(id);
    }
}

impl LocalIdentity for InMemoryRuntime {
    fn account_id(&self) -> &CoId {
        &self.account_id
    }

    fn system_spark(&self) -> &str {
        &self.system_spark
    }
}

#[async_trait]
impl CrdtRuntime for InMemoryRuntime {
    fn get_co_value(&self, id: &CoId) -> Option<CoValue> {
        let mut state = self.state.lock().expect("runtime state lock poisoned");
        self.promote_if_ready(&mut state, id);
        state.store.get(id).cloned()
    }

    async fn load_co_value_core(&self, id: &CoId, ctx: &CallContext) -> Result<CoValue, CoreError> {
        loop {
            match self.get_co_value(id) {
                Some(value) if value.is_available() => return Ok(value),
                Some(_) => {}
                None => return Err(CoreError::not_found(format!("no local core for {id}"))),
            }
            ctx.check(self.clock.as_ref())?;

            let pending_wait = {
                let state = self.state.lock().expect("runtime state lock poisoned");
                state
                    .pending
                    .get(id)
                    .map(|ready_at| ready_at.saturating_duration_since(self.clock.now()))
            };
            let wait = match pending_wait {
                Some(d) if !d.is_zero() => d,
                Some(_) => continue,
                None => match ctx.deadline() {
                    Some(deadline) => deadline.remaining(self.clock.as_ref()),
                    None => return Err(CoreError::not_found(format!("no local core for {id}"))),
                },
            };
            self.clock.sleep(wait).await;
        }
    }

    async fn mutate(
        &self,
        id: &CoId,
        edit: Box<dyn FnOnce(&mut ContentVariant) + Send>,
    ) -> Result<CoValue, CoreError> {
        let updated = {
            let mut state = self.state.lock().expect("runtime state lock poisoned");
            let value = state
                .store
                .get_mut(id)
                .ok_or_else(|| CoreError::not_found(format!("no local core for {id}")))?;
            edit(value.content_mut());
            value.clone()
        };
        self.notify(id);
        Ok(updated)
    }

    async fn create_co_value(
        &self,
        header: Header,
        variant: CoValueVariant,
        content: ContentVariant,
    ) -> Result<CoValue, CoreError> {
        let mut state = self.state.lock().expect("runtime state lock poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        let id = CoId::parse(format!("co_zgen{seq}")).expect("generated id is valid");
        let mut value = CoValue::unavailable(id.clone(), variant, header);
        value.mark_available(content);
        state.store.insert(id, value.clone());
        Ok(value)
    }

    fn subscribe(&self, id: &CoId, listener: Box<dyn Fn() + Send + Sync>) -> Box<dyn Subscription> {
        let listener_id = {
            let mut next_id = self.next_listener_id.lock().expect("runtime listener id lock poisoned");
            let listener_id = *next_id;
            *next_id += 1;
            listener_id
        };
        self.listeners
            .lock()
            .expect("runtime listeners lock poisoned")
            .entry(id.clone())
            .or_default()
            .push((listener_id, Arc::from(listener)));
        Box::new(InMemorySubscription {
            listeners: Arc::clone(&self.listeners),
            id: id.clone(),
            listener_id,
        })
    }
}
