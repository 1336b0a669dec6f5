//! Model System - dynamic records described by registered schemas
//!
//! - `schema`: table, key, timestamps, soft deletes and relation definitions
//! - `record`: shared attribute state of one row
//! - `lifecycle`: per-record queue of continuations run by `save`
//! - `registry`: schemas by model name

pub mod lifecycle;
pub mod record;
pub mod registry;
pub mod schema;

pub use lifecycle::{LifecyclePhase, PendingAction};
pub use record::{Loaded, Record, WeakRecord};
pub use registry::SchemaRegistry;
pub use schema::{ModelSchema, RecordPresenter, CREATED_AT, DELETED_AT, UPDATED_AT};
