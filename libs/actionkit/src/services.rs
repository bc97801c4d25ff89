//! Type-keyed service lookup consulted by `Service` bindings.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::value::Value;

/// Concurrent map from a service type to its shared instance.
///
/// Cloning is cheap; all clones observe the same entries.
#[derive(Clone, Default)]
pub struct ServiceProvider {
    services: Arc<DashMap<TypeId, Value>>,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the instance for `S`.
    pub fn insert<S: Any + Send + Sync>(&self, service: Arc<S>) {
        self.services
            .insert(TypeId::of::<S>(), Arc::new(service) as Value);
    }

    /// Builder-style variant of [`ServiceProvider::insert`].
    pub fn with<S: Any + Send + Sync>(self, service: Arc<S>) -> Self {
        self.insert(service);
        self
    }

    pub fn get<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.value().downcast_ref::<Arc<S>>().cloned())
    }

    /// The stored `Arc<S>` as an erased value, as bound into a handler argument.
    pub(crate) fn get_value<S: Any + Send + Sync>(&self) -> Option<Value> {
        self.services
            .get(&TypeId::of::<S>())
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock(u64);

    #[test]
    fn insert_and_get_roundtrip() {
        let provider = ServiceProvider::new().with(Arc::new(Clock(3)));
        let clock = provider.get::<Clock>().expect("clock registered");
        assert_eq!(clock.0, 3);
        assert!(provider.get::<String>().is_none());
    }

    #[test]
    fn clones_share_entries() {
        let provider = ServiceProvider::new();
        let other = provider.clone();
        other.insert(Arc::new(Clock(9)));
        assert_eq!(provider.len(), 1);
        let value = provider.get_value::<Clock>().unwrap();
        assert!(value.downcast_ref::<Arc<Clock>>().is_some());
    }
}
