//! Relation definitions - the declarative half of the relation system
//!
//! A definition names the relation, its kind, the related model and the
//! key columns, and carries the capability flags that select shared
//! behaviors (cascade delete, push, count-only, soft-delete propagation).

use crate::error::{ModelError, ModelResult};
use crate::model::ModelSchema;
use crate::query::{Condition, OrderBy};
use crate::value::snake_case;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
    MorphTo,
    MorphOne,
    MorphMany,
    MorphToMany,
    MorphedByMany,
    AttachOne,
    AttachMany,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
            Self::MorphTo => "morphTo",
            Self::MorphOne => "morphOne",
            Self::MorphMany => "morphMany",
            Self::MorphToMany => "morphToMany",
            Self::MorphedByMany => "morphedByMany",
            Self::AttachOne => "attachOne",
            Self::AttachMany => "attachMany",
        }
    }

    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::HasMany | Self::BelongsToMany | Self::MorphMany | Self::MorphToMany | Self::MorphedByMany | Self::AttachMany
        )
    }

    /// Kinds that may be written to the deferred binding ledger
    pub fn is_deferrable(self) -> bool {
        !matches!(self, Self::MorphTo)
    }

    /// Deferred bindings of this kind are committed before the parent row is
    /// written, because they set a foreign key on the parent itself
    pub fn commits_before_save(self) -> bool {
        matches!(self, Self::BelongsTo)
    }

    pub fn uses_pivot(self) -> bool {
        matches!(self, Self::BelongsToMany | Self::MorphToMany | Self::MorphedByMany)
    }

    pub fn is_attachment(self) -> bool {
        matches!(self, Self::AttachOne | Self::AttachMany)
    }

    /// The related row holds the foreign key pointing at the parent
    pub fn related_holds_key(self) -> bool {
        matches!(
            self,
            Self::HasOne | Self::HasMany | Self::MorphOne | Self::MorphMany | Self::AttachOne | Self::AttachMany
        )
    }

    fn needs_morph_name(self) -> bool {
        matches!(
            self,
            Self::MorphOne | Self::MorphMany | Self::MorphToMany | Self::MorphedByMany | Self::AttachOne | Self::AttachMany
        )
    }
}

/// Capability flags resolved when the relation is defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationFlags {
    /// Removing or parent deletion destroys the related record
    pub dependent: bool,
    /// `push` walks into loaded records of this relation
    pub pushable: bool,
    /// Results collapse into a single record carrying `count`
    pub count_only: bool,
    /// Parent soft delete and restore propagate into the relation
    pub soft_delete: bool,
    /// Parent deletion removes pivot rows
    pub detach: bool,
    /// Default visibility of attached files
    pub public: bool,
}

impl Default for RelationFlags {
    fn default() -> Self {
        Self {
            dependent: false,
            pushable: true,
            count_only: false,
            soft_delete: false,
            detach: true,
            public: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDefinition {
    pub name: String,
    pub kind: RelationKind,
    /// Related model name; empty for `MorphTo`
    pub related: String,
    /// Foreign key override (pivot: the column pointing at the parent)
    pub key: Option<String>,
    /// Owner key override (pivot: the column pointing at the related model)
    pub other_key: Option<String>,
    /// Pivot table override
    pub table: Option<String>,
    /// Morph column prefix, `attachment` for attachments
    pub morph_name: Option<String>,
    /// Extra pivot columns exposed on `Pivot`
    pub pivot: Vec<String>,
    pub conditions: Vec<Condition>,
    pub order: Vec<OrderBy>,
    pub flags: RelationFlags,
}

impl RelationDefinition {
    fn new(name: &str, kind: RelationKind, related: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            related: related.to_string(),
            key: None,
            other_key: None,
            table: None,
            morph_name: None,
            pivot: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            flags: RelationFlags::default(),
        }
    }

    pub fn has_one(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::HasOne, related)
    }

    pub fn has_many(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::HasMany, related)
    }

    pub fn belongs_to(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::BelongsTo, related)
    }

    pub fn belongs_to_many(name: &str, related: &str) -> Self {
        Self::new(name, RelationKind::BelongsToMany, related)
    }

    pub fn morph_to(name: &str) -> Self {
        Self::new(name, RelationKind::MorphTo, "")
    }

    pub fn morph_one(name: &str, related: &str, morph_name: &str) -> Self {
        Self::new(name, RelationKind::MorphOne, related).morph_name(morph_name)
    }

    pub fn morph_many(name: &str, related: &str, morph_name: &str) -> Self {
        Self::new(name, RelationKind::MorphMany, related).morph_name(morph_name)
    }

    pub fn morph_to_many(name: &str, related: &str, morph_name: &str) -> Self {
        Self::new(name, RelationKind::MorphToMany, related).morph_name(morph_name)
    }

    pub fn morphed_by_many(name: &str, related: &str, morph_name: &str) -> Self {
        Self::new(name, RelationKind::MorphedByMany, related).morph_name(morph_name)
    }

    /// Attached files are dependent and ordered by `sort_order` unless told
    /// otherwise
    pub fn attach_one(name: &str, related: &str) -> Self {
        Self::attachment(name, RelationKind::AttachOne, related)
    }

    pub fn attach_many(name: &str, related: &str) -> Self {
        Self::attachment(name, RelationKind::AttachMany, related)
    }

    fn attachment(name: &str, kind: RelationKind, related: &str) -> Self {
        let mut definition = Self::new(name, kind, related).morph_name("attachment");
        definition.flags.dependent = true;
        definition.order = vec![OrderBy::asc("sort_order"), OrderBy::asc("id")];
        definition
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn other_key(mut self, other_key: &str) -> Self {
        self.other_key = Some(other_key.to_string());
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn morph_name(mut self, morph_name: &str) -> Self {
        self.morph_name = Some(morph_name.to_string());
        self
    }

    pub fn pivot(mut self, columns: &[&str]) -> Self {
        self.pivot.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Replaces the default ordering on first use
    pub fn order_by(mut self, column: &str) -> Self {
        self.push_order(OrderBy::asc(column));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.push_order(OrderBy::desc(column));
        self
    }

    fn push_order(&mut self, order: OrderBy) {
        if self.kind.is_attachment() && self.order.first().map(|o| o.column.as_str()) == Some("sort_order") {
            self.order.clear();
        }
        self.order.push(order);
    }

    pub fn dependent(mut self, dependent: bool) -> Self {
        self.flags.dependent = dependent;
        self
    }

    pub fn pushable(mut self, pushable: bool) -> Self {
        self.flags.pushable = pushable;
        self
    }

    pub fn count_only(mut self, count_only: bool) -> Self {
        self.flags.count_only = count_only;
        self
    }

    pub fn soft_delete(mut self, soft_delete: bool) -> Self {
        self.flags.soft_delete = soft_delete;
        self
    }

    pub fn detach(mut self, detach: bool) -> Self {
        self.flags.detach = detach;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.flags.public = public;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() {
            return Err(ModelError::Relationship("relation name cannot be empty".to_string()));
        }
        if self.kind != RelationKind::MorphTo && self.related.is_empty() {
            return Err(ModelError::Relationship(format!(
                "relation '{}' of type {} needs a related model",
                self.name,
                self.kind.as_str()
            )));
        }
        if self.kind.needs_morph_name() && self.morph_name.is_none() {
            return Err(ModelError::Relationship(format!(
                "relation '{}' of type {} needs a morph name",
                self.name,
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn morph(&self) -> &str {
        self.morph_name.as_deref().unwrap_or(&self.name)
    }

    /// `MorphTo` id column on the parent, or `{morph}_id` on the related row
    pub fn morph_id_column(&self) -> String {
        format!("{}_id", self.morph())
    }

    pub fn morph_type_column(&self) -> String {
        format!("{}_type", self.morph())
    }

    /// Column holding the foreign key: on the related row for has/morph/
    /// attach kinds, on the parent for `BelongsTo`/`MorphTo`, on the pivot
    /// row (pointing at the parent) for pivot kinds.
    pub fn foreign_key(&self, parent: &ModelSchema) -> String {
        if let Some(key) = &self.key {
            return key.clone();
        }
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany | RelationKind::BelongsToMany | RelationKind::MorphedByMany => {
                parent.foreign_key()
            }
            RelationKind::BelongsTo => format!("{}_id", snake_case(&self.name)),
            _ => self.morph_id_column(),
        }
    }

    /// Key on the related model referenced by a `BelongsTo`, or the pivot
    /// column pointing at the related model
    pub fn other_key_for(&self, related: &ModelSchema) -> String {
        if let Some(key) = &self.other_key {
            return key.clone();
        }
        match self.kind {
            RelationKind::BelongsToMany | RelationKind::MorphToMany => related.foreign_key(),
            RelationKind::MorphedByMany => self.morph_id_column(),
            _ => related.key_name.clone(),
        }
    }

    pub fn pivot_table(&self, parent: &ModelSchema, related: &ModelSchema) -> String {
        if let Some(table) = &self.table {
            return table.clone();
        }
        match self.kind {
            RelationKind::MorphToMany | RelationKind::MorphedByMany => format!("{}s", self.morph()),
            _ => {
                let mut names = [snake_case(&parent.name), snake_case(&related.name)];
                names.sort();
                names.join("_")
            }
        }
    }

    /// Value stored in the pivot morph type column
    pub fn pivot_morph_type<'s>(&self, parent: &'s ModelSchema, related: &'s ModelSchema) -> Option<&'s str> {
        match self.kind {
            RelationKind::MorphToMany => Some(&parent.name),
            RelationKind::MorphedByMany => Some(&related.name),
            _ => None,
        }
    }

    /// Column written by `set_relation_order`
    pub fn sort_column(&self) -> String {
        self.order
            .first()
            .map(|o| o.column.clone())
            .unwrap_or_else(|| "sort_order".to_string())
    }
}
