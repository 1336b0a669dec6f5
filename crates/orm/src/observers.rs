use crate::context::Storm;
use crate::event_error::EventError;
use crate::events::{EventOutcome, ModelEvent, ModelObserver, RelationEvent, RelationListener};
use crate::model::Record;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Observers and relation listeners, keyed by model name
#[derive(Clone, Default)]
pub struct ObserverManager {
    observers: Arc<DashMap<String, Vec<Arc<dyn ModelObserver>>>>,
    listeners: Arc<DashMap<String, Vec<Arc<dyn RelationListener>>>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_for_model(&self, model: &str, observer: Arc<dyn ModelObserver>) {
        self.observers.entry(model.to_string()).or_default().push(observer);
    }

    pub fn listen(&self, model: &str, listener: Arc<dyn RelationListener>) {
        self.listeners.entry(model.to_string()).or_default().push(listener);
    }

    pub fn has_observers_for(&self, model: &str) -> bool {
        self.observers.get(model).map(|o| !o.is_empty()).unwrap_or(false)
    }

    pub fn observer_count(&self, model: &str) -> usize {
        self.observers.get(model).map(|o| o.len()).unwrap_or(0)
    }

    pub fn listener_count(&self, model: &str) -> usize {
        self.listeners.get(model).map(|l| l.len()).unwrap_or(0)
    }

    // Snapshots so no map guard is held while observers run
    fn observers_for(&self, model: &str) -> Vec<Arc<dyn ModelObserver>> {
        self.observers.get(model).map(|o| o.clone()).unwrap_or_default()
    }

    fn listeners_for(&self, model: &str) -> Vec<Arc<dyn RelationListener>> {
        self.listeners.get(model).map(|l| l.clone()).unwrap_or_default()
    }

    /// Run `event` through every observer of the record's model, stopping at
    /// the first error
    pub async fn trigger(&self, storm: &Storm, event: ModelEvent, record: &Record) -> Result<(), EventError> {
        for observer in self.observers_for(record.model_name()) {
            match event {
                ModelEvent::Creating => observer.creating(storm, record).await?,
                ModelEvent::Created => observer.created(storm, record).await?,
                ModelEvent::Updating => observer.updating(storm, record).await?,
                ModelEvent::Updated => observer.updated(storm, record).await?,
                ModelEvent::Saving => observer.saving(storm, record).await?,
                ModelEvent::Saved => observer.saved(storm, record).await?,
                ModelEvent::Deleting => observer.deleting(storm, record).await?,
                ModelEvent::Deleted => observer.deleted(storm, record).await?,
                ModelEvent::Restored => observer.restored(storm, record).await?,
            }
        }
        Ok(())
    }

    /// Deliver a relation event to the parent model's listeners. A `before*`
    /// event stops at the first `Halt`.
    pub async fn fire(&self, event: &RelationEvent) -> Result<EventOutcome, EventError> {
        for listener in self.listeners_for(event.parent.model_name()) {
            if listener.handle(event).await? == EventOutcome::Halt && event.kind.is_before() {
                debug!("{} on '{}' halted by listener", event.name(), event.relation);
                return Ok(EventOutcome::Halt);
            }
        }
        Ok(EventOutcome::Continue)
    }
}
