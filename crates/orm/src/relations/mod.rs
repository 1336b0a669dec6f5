//! Relations between models
//!
//! `definition` declares relations on a schema, `relation` binds one to a
//! parent record. Behavior is split by where the keys live:
//! `has_one_or_many` (related row holds the key, attachments included),
//! `belongs_to` (parent holds the key, `MorphTo` included) and
//! `belongs_to_many` (pivot table). `capabilities` holds the flag-driven
//! behaviors shared by all kinds.

pub mod attach_one_or_many;
pub mod belongs_to;
pub mod belongs_to_many;
pub mod capabilities;
pub mod definition;
pub mod has_one_or_many;
pub mod relation;
pub mod value;

pub use attach_one_or_many::IS_PUBLIC;
pub use belongs_to_many::{Pivot, SyncChanges};
pub use definition::{RelationDefinition, RelationFlags, RelationKind};
pub use relation::Relation;
pub use value::RelationValue;
