//! Process-wide table from generated keys to handler logic.
//!
//! A synthesized unit only stores keys; the logic itself is looked up here at
//! call time. Entries are never removed.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use uuid::Uuid;

use crate::logic::LogicRef;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey(String);

impl HandlerKey {
    fn generate() -> Self {
        Self(format!("handler-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerKey, LogicRef>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance for the lifetime of the process.
    pub fn global() -> Arc<HandlerRegistry> {
        static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(HandlerRegistry::new()))
            .clone()
    }

    /// Stores `logic` under a fresh key. Every call yields a distinct key.
    pub fn add(&self, logic: LogicRef) -> HandlerKey {
        loop {
            let key = HandlerKey::generate();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.handlers.entry(key.clone()) {
                slot.insert(logic);
                tracing::trace!(key = %key, "registered handler logic");
                return key;
            }
        }
    }

    pub fn get(&self, key: &HandlerKey) -> Option<LogicRef> {
        self.handlers.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
