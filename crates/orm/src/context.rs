//! The persistence context
//!
//! `Storm` owns the record store, the schema registry, observers and the
//! identity cache. It is cheap to clone; every clone shares the same state.
//! Record persistence lives in `persistence.rs`, relation access in
//! `relations/`, the deferred binding ledger in `deferred/`.

use crate::config::OrmConfig;
use crate::deferred::DeferredLedger;
use crate::error::ModelResult;
use crate::events::{EventOutcome, FnListener, ModelObserver, RelationEvent, RelationListener};
use crate::identity::IdentityCache;
use crate::model::{ModelSchema, Record, SchemaRegistry};
use crate::observers::ObserverManager;
use crate::query::Query;
use crate::store::{MemoryStore, RecordStore};
use crate::value::Row;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

struct StormInner {
    store: Arc<dyn RecordStore>,
    schemas: SchemaRegistry,
    observers: ObserverManager,
    identity: IdentityCache,
    config: OrmConfig,
}

#[derive(Clone)]
pub struct Storm {
    inner: Arc<StormInner>,
}

impl Storm {
    pub fn new(store: Arc<dyn RecordStore>, config: OrmConfig) -> Self {
        let identity = IdentityCache::new(*config.get_identity_cache(), *config.get_identity_cache_capacity());
        Self {
            inner: Arc::new(StormInner {
                store,
                schemas: SchemaRegistry::new(),
                observers: ObserverManager::new(),
                identity,
                config,
            }),
        }
    }

    /// Context over a fresh in-process store with default settings
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), OrmConfig::default())
    }

    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    pub fn observers(&self) -> &ObserverManager {
        &self.inner.observers
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.inner.identity
    }

    pub fn register(&self, schema: ModelSchema) -> ModelResult<Arc<ModelSchema>> {
        self.inner.schemas.register(schema)
    }

    pub fn schema(&self, model: &str) -> ModelResult<Arc<ModelSchema>> {
        self.inner.schemas.get(model)
    }

    pub fn observe(&self, model: &str, observer: Arc<dyn ModelObserver>) {
        self.inner.observers.register_for_model(model, observer);
    }

    pub fn listen(&self, model: &str, listener: Arc<dyn RelationListener>) {
        self.inner.observers.listen(model, listener);
    }

    pub fn listen_fn<F>(&self, model: &str, listener: F)
    where
        F: Fn(&RelationEvent) -> EventOutcome + Send + Sync + 'static,
    {
        self.listen(model, Arc::new(FnListener(listener)));
    }

    /// Unsaved record of a registered model
    pub fn new_record(&self, model: &str) -> ModelResult<Record> {
        Ok(Record::new(self.schema(model)?))
    }

    /// Unsaved record filled with `attributes`
    pub fn make(&self, model: &str, attributes: Row) -> ModelResult<Record> {
        let record = self.new_record(model)?;
        record.fill(attributes);
        Ok(record)
    }

    pub fn hydrate(&self, schema: &Arc<ModelSchema>, row: Row) -> Record {
        Record::from_row(schema.clone(), row)
    }

    /// Fresh key grouping the deferred bindings of one editing session
    pub fn new_session_key() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn ledger(&self) -> DeferredLedger<'_> {
        DeferredLedger::new(self)
    }

    /// Rows matching `query`, through the identity cache when it is on.
    /// Ledger rows are always read from the store: other contexts write them.
    pub async fn select(&self, query: &Query) -> ModelResult<Vec<Row>> {
        if query.table == *self.inner.config.get_deferred_table() {
            return self.inner.store.select(query).await;
        }
        if let Some(rows) = self.inner.identity.get(query) {
            trace!("identity cache hit on {}", query.table);
            return Ok(rows);
        }
        let rows = self.inner.store.select(query).await?;
        self.inner.identity.put(query, &rows);
        Ok(rows)
    }

    pub async fn insert(&self, table: &str, key_name: &str, row: Row) -> ModelResult<Row> {
        let stored = self.inner.store.insert(table, key_name, row).await?;
        self.inner.identity.forget_table(table);
        Ok(stored)
    }

    pub async fn update(&self, query: &Query, values: Row) -> ModelResult<u64> {
        let affected = self.inner.store.update(query, values).await?;
        self.inner.identity.forget_table(&query.table);
        Ok(affected)
    }

    pub async fn delete_where(&self, query: &Query) -> ModelResult<u64> {
        let affected = self.inner.store.delete(query).await?;
        self.inner.identity.forget_table(&query.table);
        Ok(affected)
    }

    pub async fn count_by(&self, query: &Query, column: &str) -> ModelResult<Vec<(Value, i64)>> {
        self.inner.store.count_by(query, column).await
    }
}

impl fmt::Debug for Storm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storm")
            .field("models", &self.inner.schemas.names())
            .field("config", &self.inner.config)
            .finish()
    }
}
