//! Lifecycle hooks
//!
//! Listeners registered on [`Hooks`] are called synchronously at fixed points
//! of a run. They can observe every stage; only `before_property` may change
//! the outcome, and only for a single field.

use crate::core::report::{EntityStats, Report};
use crate::domain::{EntitySpec, Record, Value};
use std::sync::Arc;

/// Verdict of a `before_property` listener
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDecision {
    /// Use the computed value
    Keep,
    /// Use this value instead
    Override(Value),
    /// Leave the field untouched
    Skip,
}

/// Field about to be anonymized
#[derive(Debug)]
pub struct PropertyEvent<'a> {
    pub entity: &'a str,
    pub record: &'a Record,
    pub property: &'a str,
    pub original: &'a Value,
    pub computed: &'a Value,
}

/// Observer of run, entity and property lifecycle events
///
/// Every method has a no-op default; implement the ones you need.
pub trait LifecycleListener: Send + Sync {
    fn before_run(&self, _entities: &[EntitySpec]) {}

    fn after_run(&self, _report: &Report) {}

    fn before_entity(&self, _connection: &str, _entity: &EntitySpec) {}

    fn after_entity(&self, _connection: &str, _entity: &EntitySpec, _stats: &EntityStats) {}

    fn before_property(&self, _event: &PropertyEvent<'_>) -> PropertyDecision {
        PropertyDecision::Keep
    }
}

/// Ordered listener list
#[derive(Clone, Default)]
pub struct Hooks {
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn before_run(&self, entities: &[EntitySpec]) {
        for listener in &self.listeners {
            listener.before_run(entities);
        }
    }

    pub fn after_run(&self, report: &Report) {
        for listener in &self.listeners {
            listener.after_run(report);
        }
    }

    pub fn before_entity(&self, connection: &str, entity: &EntitySpec) {
        for listener in &self.listeners {
            listener.before_entity(connection, entity);
        }
    }

    pub fn after_entity(&self, connection: &str, entity: &EntitySpec, stats: &EntityStats) {
        for listener in &self.listeners {
            listener.after_entity(connection, entity, stats);
        }
    }

    /// Ask every listener in order
    ///
    /// Overrides chain: each listener sees the value left by the previous one.
    /// The first `Skip` wins.
    pub fn before_property(
        &self,
        entity: &str,
        record: &Record,
        property: &str,
        original: &Value,
        computed: Value,
    ) -> PropertyDecision {
        let mut current = computed;
        let mut overridden = false;
        for listener in &self.listeners {
            let event = PropertyEvent {
                entity,
                record,
                property,
                original,
                computed: &current,
            };
            match listener.before_property(&event) {
                PropertyDecision::Keep => {}
                PropertyDecision::Override(value) => {
                    current = value;
                    overridden = true;
                }
                PropertyDecision::Skip => return PropertyDecision::Skip,
            }
        }
        if overridden {
            PropertyDecision::Override(current)
        } else {
            PropertyDecision::Keep
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
