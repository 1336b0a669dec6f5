//! # storm-orm: records, relations and deferred bindings
//!
//! A small persistence layer built around three pieces:
//!
//! - a `Storm` context that owns the record store, model schemas, observers
//!   and an identity cache
//! - a relation family (has/belongs-to, morph, pivot and attachment
//!   relations) with capability flags for cascades, push and counting
//! - a deferred binding ledger that records relation changes made before
//!   the parent has a key, and replays them when the parent is saved with
//!   the same session key
//!
//! Rows move through the `RecordStore` trait; `MemoryStore` keeps them in
//! process and `PgStore` maps them onto PostgreSQL.

pub mod config;
pub mod context;
pub mod deferred;
pub mod error;
pub mod event_error;
pub mod events;
pub mod identity;
pub mod migration;
pub mod model;
pub mod observers;
pub mod persistence;
pub mod query;
pub mod relations;
pub mod security;
pub mod store;
pub mod value;

pub use config::{OrmConfig, OrmConfigBuilder};
pub use context::Storm;
pub use deferred::{resolve_bindings, BindingGroup, CommitPhase, DeferredBinding, DeferredLedger, Membership};
pub use error::{ModelError, ModelResult};
pub use event_error::EventError;
pub use events::{EventOutcome, FnListener, ModelEvent, ModelObserver, RelationEvent, RelationEventKind, RelationListener};
pub use identity::{IdentityCache, IdentityStats};
pub use migration::{deferred_bindings_migration, Migration};
pub use model::{
    LifecyclePhase, Loaded, ModelSchema, PendingAction, Record, RecordPresenter, SchemaRegistry, WeakRecord,
    CREATED_AT, DELETED_AT, UPDATED_AT,
};
pub use observers::ObserverManager;
pub use query::{Condition, Direction, OrderBy, Query};
pub use relations::{
    Pivot, Relation, RelationDefinition, RelationFlags, RelationKind, RelationValue, SyncChanges, IS_PUBLIC,
};
pub use store::{MemoryStore, PgStore, RecordStore};
pub use value::{BoxFuture, Row};
