use crate::context::Storm;
use crate::event_error::EventError;
use crate::model::Record;
use crate::value::Row;
use async_trait::async_trait;
use std::fmt;

/// Record lifecycle notifications delivered to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    Creating,
    Created,
    Updating,
    Updated,
    Saving,
    Saved,
    Deleting,
    Deleted,
    Restored,
}

/// Observer of one model's records. A `creating`, `updating`, `saving` or
/// `deleting` error aborts the operation.
#[async_trait]
pub trait ModelObserver: Send + Sync {
    async fn creating(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn created(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn updating(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn updated(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn saving(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn saved(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleting(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleted(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }

    async fn restored(&self, _storm: &Storm, _record: &Record) -> Result<(), EventError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationEventKind {
    BeforeAdd,
    AfterAdd,
    BeforeRemove,
    AfterRemove,
    BeforeAssociate,
    AfterAssociate,
    BeforeDissociate,
    AfterDissociate,
}

impl RelationEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAdd => "beforeAdd",
            Self::AfterAdd => "afterAdd",
            Self::BeforeRemove => "beforeRemove",
            Self::AfterRemove => "afterRemove",
            Self::BeforeAssociate => "beforeAssociate",
            Self::AfterAssociate => "afterAssociate",
            Self::BeforeDissociate => "beforeDissociate",
            Self::AfterDissociate => "afterDissociate",
        }
    }

    /// Only `before*` events can veto
    pub fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeAdd | Self::BeforeRemove | Self::BeforeAssociate | Self::BeforeDissociate
        )
    }
}

impl fmt::Display for RelationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model.relation.{}", self.as_str())
    }
}

/// An immediate relation mutation, delivered to listeners of the parent model
#[derive(Debug, Clone)]
pub struct RelationEvent {
    pub kind: RelationEventKind,
    pub parent: Record,
    pub relation: String,
    pub related: Option<Record>,
    pub pivot: Row,
}

impl RelationEvent {
    pub fn new(kind: RelationEventKind, parent: &Record, relation: &str, related: Option<&Record>) -> Self {
        Self {
            kind,
            parent: parent.clone(),
            relation: relation.to_string(),
            related: related.cloned(),
            pivot: Row::new(),
        }
    }

    pub fn with_pivot(mut self, pivot: Row) -> Self {
        self.pivot = pivot;
        self
    }

    /// `model.relation.beforeAdd` and friends
    pub fn name(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Continue,
    /// Veto a `before*` event; ignored for `after*` events
    Halt,
}

#[async_trait]
pub trait RelationListener: Send + Sync {
    async fn handle(&self, event: &RelationEvent) -> Result<EventOutcome, EventError>;
}

/// Listener from a plain closure
pub struct FnListener<F>(pub F);

#[async_trait]
impl<F> RelationListener for FnListener<F>
where
    F: Fn(&RelationEvent) -> EventOutcome + Send + Sync,
{
    async fn handle(&self, event: &RelationEvent) -> Result<EventOutcome, EventError> {
        Ok((self.0)(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSchema;
    use std::sync::Arc;

    #[test]
    fn test_event_names() {
        let parent = Record::new(Arc::new(ModelSchema::new("Post", "posts")));
        let event = RelationEvent::new(RelationEventKind::BeforeAdd, &parent, "comments", None);
        assert_eq!(event.name(), "model.relation.beforeAdd");
        assert_eq!(RelationEventKind::AfterDissociate.to_string(), "model.relation.afterDissociate");
        assert!(RelationEventKind::BeforeRemove.is_before());
        assert!(!RelationEventKind::AfterRemove.is_before());
    }

    #[tokio::test]
    async fn test_fn_listener() {
        let parent = Record::new(Arc::new(ModelSchema::new("Post", "posts")));
        let listener = FnListener(|event: &RelationEvent| {
            if event.relation == "locked" {
                EventOutcome::Halt
            } else {
                EventOutcome::Continue
            }
        });

        let open = RelationEvent::new(RelationEventKind::BeforeAdd, &parent, "comments", None);
        let locked = RelationEvent::new(RelationEventKind::BeforeAdd, &parent, "locked", None);
        assert_eq!(listener.handle(&open).await.unwrap(), EventOutcome::Continue);
        assert_eq!(listener.handle(&locked).await.unwrap(), EventOutcome::Halt);
    }
}
