//! [`Crud`]: the single dispatcher for read/create/update/delete over the
//! CoValue graph (§4.7).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::context::{CallContext, Deadline};
use crate::error::{CoreError, ErrorKind};
use crate::extractor::{extract_flat, extract_normalised, Flat, Normalised, SchemaHint};
use crate::loader::{LoadOptions, Loader};
use crate::model::{CoId, ContentVariant, CoValueVariant, Header, Identifier, MapContent, SchemaRef};
use crate::runtime::CrdtRuntime;
use crate::schema_index::SchemaIndex;
use crate::schema_resolver::{Resolved, ResolveOptions, ReturnType, SchemaResolver};
use crate::store::ReactiveStore;
use crate::subscription_cache::SubscriptionCache;

/// Default upper bound on a single-read's readiness (§5).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Default upper bound on default-group resolution (§5).
pub const DEFAULT_GROUP_TIMEOUT: Duration = Duration::from_secs(10);

/// What a single-item read's store carries: the source treats loading,
/// ready and errored as distinct states rather than conflating them behind
/// one ambiguous predicate (§9 Open Questions, "Store readiness
/// predicate").
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    Loading { id: CoId },
    Ready(Flat),
    Errored { id: CoId, error: String },
}

impl Default for ReadOutcome {
    fn default() -> Self {
        Self::Loading {
            id: CoId::parse("co_zpending").expect("literal id is valid"),
        }
    }
}

pub type ItemStore = ReactiveStore<ReadOutcome>;
pub type CollectionStore = ReactiveStore<Vec<Flat>>;

/// A filter applied to collection/all-values reads: every `(key, value)`
/// pair must match by strict equality — no coercion between `false` and
/// absence (§4.7.2).
pub type Filter = HashMap<String, Value>;

fn matches_filter(item: &Flat, filter: &Filter) -> bool {
    filter.iter().all(|(key, expected)| item.get(key) == Some(expected))
}

/// Drives a single store's post-return liveness: the background load for a
/// single read (§4.7.1), and the per-id subscription fan-out that keeps a
/// collection read current (§4.7.2 step 6). Split out from `Crud` because
/// it is handed to [`crate::executor::spawn`] and must own everything it
/// touches rather than borrow `&Crud`.
#[derive(Clone)]
struct ReadReactor {
    runtime: Arc<dyn CrdtRuntime>,
    loader: Loader,
    schema_index: Arc<SchemaIndex>,
    clock: Arc<dyn crate::time::Clock>,
    cache: SubscriptionCache,
}

impl ReadReactor {
    fn ctx(&self) -> CallContext {
        CallContext::with_deadline(Deadline::after(DEFAULT_READ_TIMEOUT, self.clock.as_ref()))
    }

    /// Performs the actual load in the background, then updates `store`
    /// once it settles. On success, installs a subscription so later
    /// updates to `id` re-extract and re-emit without another `read_single`
    /// call (§4.7.1: "subscribe to core updates and emit flat extraction on
    /// each update").
    fn watch_single(self, id: CoId, store: ItemStore) {
        crate::executor::spawn(async move {
            let outcome = match self
                .loader
                .ensure_loaded(&id, LoadOptions { wait_for_available: true, timeout: DEFAULT_READ_TIMEOUT })
                .await
            {
                Ok(Some(value)) if value.is_available() => ReadOutcome::Ready(extract_flat(&value, SchemaHint::None)),
                Ok(Some(_)) => ReadOutcome::Errored { id: id.clone(), error: "timed out waiting for availability".to_string() },
                Ok(None) => ReadOutcome::Errored { id: id.clone(), error: "no local core".to_string() },
                Err(err) => ReadOutcome::Errored { id: id.clone(), error: err.message().to_string() },
            };
            let is_ready = matches!(outcome, ReadOutcome::Ready(_));
            store.set(outcome);

            if is_ready {
                let runtime = Arc::clone(&self.runtime);
                let id_for_sub = id.clone();
                let store_for_sub = store.clone();
                self.cache.get_or_create(&id, move || {
                    let runtime_for_listener = Arc::clone(&runtime);
                    let id_for_listener = id_for_sub.clone();
                    let store_for_listener = store_for_sub.clone();
                    runtime.subscribe(
                        &id_for_sub,
                        Box::new(move || {
                            if let Some(value) = runtime_for_listener.get_co_value(&id_for_listener) {
                                if value.is_available() {
                                    store_for_listener.set(ReadOutcome::Ready(extract_flat(&value, SchemaHint::None)));
                                }
                            }
                        }),
                    )
                });
            }
        });
    }

    async fn collection_snapshot(
        &self,
        schema_id: &CoId,
        filter: Option<&Filter>,
        ctx: &CallContext,
    ) -> Result<(Vec<CoId>, Vec<Flat>), CoreError> {
        let member_ids = self.schema_index.snapshot(schema_id, ctx).await?;
        let mut items = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            let loaded = self.loader.ensure_loaded(id, LoadOptions { wait_for_available: false, ..Default::default() }).await?;
            if let Some(value) = loaded {
                if value.is_available() {
                    let flat = extract_flat(&value, SchemaHint::None);
                    if filter.map_or(true, |f| matches_filter(&flat, f)) {
                        items.push(flat);
                    }
                }
            }
        }
        Ok((member_ids, items))
    }

    /// Re-runs a collection's snapshot and emits it onto `store` only if it
    /// differs from the last emitted value (§4.7.2 step 5), returning the
    /// current member ids so the caller can refresh its watch set.
    async fn refresh_collection(
        &self,
        store: &CollectionStore,
        schema_id: &CoId,
        filter: Option<&Filter>,
        ctx: &CallContext,
    ) -> Result<Vec<CoId>, CoreError> {
        let (member_ids, snapshot) = self.collection_snapshot(schema_id, filter, ctx).await?;
        if snapshot != store.value() {
            store.set(snapshot);
        }
        Ok(member_ids)
    }

    /// Installs a subscription on the index list and on every current
    /// member id; any of them updating triggers a re-run of steps 2-5 and
    /// then re-installs the watch set against the (possibly changed)
    /// membership (§4.7.2 step 6). `get_or_create` makes repeated calls for
    /// an id that's still watched a no-op.
    fn watch_collection(self, schema_id: CoId, filter: Option<Filter>, member_ids: Vec<CoId>, store: CollectionStore) {
        let mut watch_ids = member_ids;
        if let Some(list_id) = self.schema_index.index_list_for(&schema_id) {
            watch_ids.push(list_id);
        }
        for watched_id in watch_ids {
            let reactor = self.clone();
            let schema_id = schema_id.clone();
            let filter = filter.clone();
            let store = store.clone();
            let subscribe_id = watched_id.clone();
            self.cache.get_or_create(&watched_id, move || {
                let runtime = Arc::clone(&reactor.runtime);
                runtime.subscribe(
                    &subscribe_id,
                    Box::new(move || {
                        let reactor = reactor.clone();
                        let schema_id = schema_id.clone();
                        let filter = filter.clone();
                        let store = store.clone();
                        crate::executor::spawn(async move {
                            let ctx = reactor.ctx();
                            if let Ok(member_ids) = reactor.refresh_collection(&store, &schema_id, filter.as_ref(), &ctx).await {
                                reactor.watch_collection(schema_id, filter, member_ids, store);
                            }
                        });
                    }),
                )
            });
        }
    }
}

pub struct Crud {
    runtime: Arc<dyn CrdtRuntime>,
    loader: Loader,
    resolver: SchemaResolver,
    schema_index: Arc<SchemaIndex>,
    clock: Arc<dyn crate::time::Clock>,
    default_group: Mutex<Option<CoId>>,
    reactor: ReadReactor,
}

impl Crud {
    pub fn new(
        runtime: Arc<dyn CrdtRuntime>,
        schema_index: Arc<SchemaIndex>,
        clock: Arc<dyn crate::time::Clock>,
    ) -> Self {
        let loader = Loader::new(Arc::clone(&runtime), Arc::clone(&clock));
        let cache = SubscriptionCache::new(Arc::clone(&clock));
        let reactor = ReadReactor {
            runtime: Arc::clone(&runtime),
            loader: loader.clone(),
            schema_index: Arc::clone(&schema_index),
            clock: Arc::clone(&clock),
            cache,
        };
        Self {
            loader,
            resolver: SchemaResolver::new(Arc::clone(&runtime)),
            schema_index,
            clock,
            runtime,
            default_group: Mutex::new(None),
            reactor,
        }
    }

    fn ctx(&self, timeout: Duration) -> CallContext {
        CallContext::with_deadline(Deadline::after(timeout, self.clock.as_ref()))
    }

    async fn resolve_to_co_id(&self, identifier: &Identifier, ctx: &CallContext) -> Result<Option<CoId>, CoreError> {
        match self.resolver.resolve(identifier, &ResolveOptions { return_type: ReturnType::CoId, spark: None }, ctx).await? {
            Resolved::CoId(id) => Ok(Some(id)),
            Resolved::Missing => Ok(None),
            Resolved::Schema(_) => unreachable!("ReturnType::CoId never yields Resolved::Schema"),
        }
    }

    // ---- 4.7.1 read ---------------------------------------------------

    /// Single-item read: returns a store that is immediately `Loading`,
    /// updates to `Ready`/`Errored` once the background load settles, and
    /// keeps re-emitting `Ready` on every subsequent update to the core
    /// (§4.7.1).
    pub async fn read_single(&self, identifier: &Identifier) -> Result<ItemStore, CoreError> {
        let ctx = self.ctx(DEFAULT_READ_TIMEOUT);
        let Some(id) = self.resolve_to_co_id(identifier, &ctx).await? else {
            return Ok(ReactiveStore::new(ReadOutcome::Errored {
                id: CoId::parse("co_zunresolved").expect("literal id is valid"),
                error: "identifier did not resolve to a co-id".to_string(),
            }));
        };

        let store = ReactiveStore::new(ReadOutcome::Loading { id: id.clone() });
        self.reactor.clone().watch_single(id, store.clone());
        Ok(store)
    }

    pub async fn read_batch(&self, identifiers: &[Identifier]) -> Result<Vec<ItemStore>, CoreError> {
        let mut stores = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            stores.push(self.read_single(identifier).await?);
        }
        Ok(stores)
    }

    /// All-values read: every known CoValue, filtered.
    pub async fn read_all(&self, known_ids: &[CoId], filter: Option<&Filter>) -> Result<CollectionStore, CoreError> {
        let mut items = Vec::new();
        for id in known_ids {
            if let Some(value) = self.runtime.get_co_value(id) {
                if value.is_available() {
                    let flat = extract_flat(&value, SchemaHint::None);
                    if filter.map_or(true, |f| matches_filter(&flat, f)) {
                        items.push(flat);
                    }
                }
            }
        }
        Ok(ReactiveStore::new(items))
    }

    /// Collection read (§4.7.2): resolves `schema`'s index list, loads
    /// every member, applies `filter`, then installs per-id subscriptions
    /// so the store keeps re-emitting as members change (step 6).
    pub async fn read_collection(&self, schema: &Identifier, filter: Option<&Filter>) -> Result<CollectionStore, CoreError> {
        let ctx = self.ctx(DEFAULT_READ_TIMEOUT);
        let Some(schema_id) = self.resolve_to_co_id(schema, &ctx).await? else {
            return Ok(ReactiveStore::new(Vec::new()));
        };
        let (member_ids, snapshot) = self.reactor.collection_snapshot(&schema_id, filter, &ctx).await?;
        let store = ReactiveStore::new(snapshot);
        self.reactor.clone().watch_collection(schema_id, filter.cloned(), member_ids, store.clone());
        Ok(store)
    }

    // ---- 4.7.3 create ---------------------------------------------------

    fn infer_cotype(schema_cotype: Option<&str>, data: &Value) -> Result<CoValueVariant, CoreError> {
        if let Some(cotype) = schema_cotype {
            return match cotype {
                "comap" => Ok(CoValueVariant::Map),
                "colist" => Ok(CoValueVariant::List),
                "costream" => Ok(CoValueVariant::Stream),
                other => Err(CoreError::structural(format!("unsupported cotype '{other}'"))),
            };
        }
        match data {
            Value::Array(_) => Ok(CoValueVariant::List),
            Value::Object(_) => Ok(CoValueVariant::Map),
            other => Err(CoreError::structural(format!("cannot infer cotype from payload {other}"))),
        }
    }

    async fn default_group_id(&self, ctx: &CallContext) -> Result<CoId, CoreError> {
        if let Some(cached) = self.default_group.lock().expect("default group lock poisoned").clone() {
            return Ok(cached);
        }
        let account = self.runtime.load_co_value_core(self.runtime.account_id(), ctx).await?;
        let group_raw = account
            .content()
            .as_map()
            .and_then(|m| m.get("profile"))
            .and_then(Value::as_object)
            .and_then(|profile| profile.get("group"))
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::structural("account.profile.group is missing"))?;
        let group_id = CoId::parse(group_raw)?;
        *self.default_group.lock().expect("default group lock poisoned") = Some(group_id.clone());
        Ok(group_id)
    }

    /// Creates a CoValue against the default group, returns its flat
    /// extraction. Schema index append failures are logged but never fail
    /// `create` itself (§4.7.6).
    pub async fn create(&self, schema_id: &CoId, schema_cotype: Option<&str>, data: Value) -> Result<Flat, CoreError> {
        let ctx = self.ctx(DEFAULT_GROUP_TIMEOUT);
        let variant = Self::infer_cotype(schema_cotype, &data)?;
        let group_id = self.default_group_id(&ctx).await?;

        let content = match variant {
            CoValueVariant::Map => {
                let mut map = MapContent::new();
                if let Value::Object(obj) = &data {
                    for (key, value) in obj {
                        map.set(key.clone(), value.clone());
                    }
                }
                map.set("group", Value::String(group_id.to_string()));
                ContentVariant::Map(map)
            }
            CoValueVariant::List => {
                let mut list = crate::model::ListContent::new();
                if let Value::Array(items) = data {
                    for item in items {
                        list.append(item);
                    }
                }
                ContentVariant::List(list)
            }
            CoValueVariant::Stream => ContentVariant::Stream(Default::default()),
            CoValueVariant::Group | CoValueVariant::Account => {
                return Err(CoreError::structural("create does not mint group/account CoValues directly"))
            }
        };

        let header = Header::for_schema(SchemaRef::CoValue(schema_id.clone()));
        let created = self.runtime.create_co_value(header, variant, content).await?;

        if variant == CoValueVariant::Map {
            if let Err(err) = self.schema_index.append(schema_id, created.id(), &ctx).await {
                warn!(schema = %schema_id, item = %created.id(), error = %err, "index append failed, continuing");
            }
        }

        Ok(extract_flat(&created, SchemaHint::None))
    }

    // ---- 4.7.4 update ---------------------------------------------------

    /// Updates a map-variant CoValue's keys, returning the normalised
    /// extraction (§4.7.4). Rejects list/stream/group targets.
    pub async fn update(&self, id: &CoId, data: &HashMap<String, Value>) -> Result<Normalised, CoreError> {
        let ctx = self.ctx(DEFAULT_READ_TIMEOUT);
        let value = self
            .loader
            .ensure_loaded(id, LoadOptions { wait_for_available: true, timeout: DEFAULT_READ_TIMEOUT })
            .await?
            .ok_or_else(|| CoreError::not_found(format!("{id} has no local core")))?;
        if !value.is_available() {
            return Err(CoreError::timeout(format!("{id} did not become available")));
        }
        if value.content().as_map().is_none() {
            return Err(CoreError::structural(format!("{id} is not a map variant and cannot be updated")));
        }

        let data = data.clone();
        let updated = self
            .runtime
            .mutate(
                id,
                Box::new(move |content| {
                    if let Some(map) = content.as_map_mut() {
                        for (key, value) in data {
                            map.set(key, value);
                        }
                    }
                }),
            )
            .await?;

        Ok(extract_normalised(&updated, SchemaHint::None))
    }

    // ---- 4.7.5 delete (hard) --------------------------------------------

    /// Hard-deletes a map-variant CoValue's content. The id survives —
    /// only its keys are cleared (§3 Lifecycle).
    pub async fn delete(&self, id: &CoId, schema_id: Option<&CoId>) -> Result<bool, CoreError> {
        let ctx = self.ctx(DEFAULT_READ_TIMEOUT);
        let value = self
            .loader
            .ensure_loaded(id, LoadOptions { wait_for_available: true, timeout: DEFAULT_READ_TIMEOUT })
            .await?
            .ok_or_else(|| CoreError::not_found(format!("{id} has no local core")))?;
        if !value.is_available() {
            return Err(CoreError::timeout(format!("{id} did not become available")));
        }
        if value.content().as_map().is_none() {
            return Err(CoreError::structural(format!("{id} is not a map variant and cannot be deleted")));
        }

        let resolved_schema = schema_id.cloned().or_else(|| {
            value.header().schema().and_then(|s| s.as_co_id()).cloned()
        });
        if let Some(schema_id) = resolved_schema {
            self.schema_index.remove(&schema_id, id, &ctx).await?;
        }

        self.runtime
            .mutate(
                id,
                Box::new(|content| {
                    if let Some(map) = content.as_map_mut() {
                        map.clear();
                    }
                }),
            )
            .await?;

        Ok(true)
    }
}

impl ErrorKind {
    /// Whether a failure on this operation should surface via a store
    /// (`read`) rather than being thrown directly (`create`/`update`/`delete`).
    pub fn is_read_path_failure(self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::Timeout | ErrorKind::Transient)
    }
}
