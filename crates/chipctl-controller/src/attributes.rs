//! Attribute store commands read and write through.

use chipctl_core::{AttributePath, AttributeValue};
use std::collections::BTreeMap;
use tracing::trace;

/// Handle returned by `subscribe`
pub type SubscriptionId = u64;

/// Change notification callback
pub type AttributeCallback = Box<dyn FnMut(&AttributePath, &AttributeValue)>;

/// Data-model storage as seen by commands
pub trait AttributeStore {
    /// Current value at `path`
    fn read(&self, path: &AttributePath) -> Option<AttributeValue>;

    /// Store a value; returns true if it differed from the previous one
    fn write(&mut self, path: AttributePath, value: AttributeValue) -> bool;

    /// Register a change callback
    fn subscribe(&mut self, callback: AttributeCallback) -> SubscriptionId;

    /// Drop a callback; returns false for unknown ids
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Number of registered callbacks
    fn subscription_count(&self) -> usize;
}

/// Attribute store kept in memory for the life of the stack
#[derive(Default)]
pub struct InMemoryAttributeStore {
    values: BTreeMap<AttributePath, AttributeValue>,
    subscribers: BTreeMap<SubscriptionId, AttributeCallback>,
    next_subscription: SubscriptionId,
}

impl InMemoryAttributeStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn read(&self, path: &AttributePath) -> Option<AttributeValue> {
        self.values.get(path).cloned()
    }

    fn write(&mut self, path: AttributePath, value: AttributeValue) -> bool {
        if self.values.get(&path) == Some(&value) {
            return false;
        }
        trace!(%path, %value, "attribute changed");
        for callback in self.subscribers.values_mut() {
            callback(&path, &value);
        }
        self.values.insert(path, value);
        true
    }

    fn subscribe(&mut self, callback: AttributeCallback) -> SubscriptionId {
        self.next_subscription += 1;
        self.subscribers.insert(self.next_subscription, callback);
        self.next_subscription
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    fn subscription_count(&self) -> usize {
        self.subscribers.len()
    }
}
