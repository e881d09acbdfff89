//! # In-Memory Provider
//!
//! Static defaults and runtime overrides (command-line flags, tests).

use super::store::ConfigProvider;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug)]
pub struct InMemoryProvider {
    name: String,
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_items(name, Vec::new())
    }

    pub fn with_items(name: impl Into<String>, items: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(items.into_iter().collect()),
        }
    }

    /// Set or replace a value
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Remove a value, so lower-priority providers become visible again
    pub fn remove(&self, key: &str) {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl ConfigProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
