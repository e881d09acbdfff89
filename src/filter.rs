//! # Event-Class Filter
//!
//! Partitions watched custom resources between operator instances by the
//! class annotation (`goharbor.io/harbor` unless configured otherwise).
//!
//! An operator with an empty class owns every resource without the annotation
//! (or with an empty value); an operator with class `A` owns exactly the
//! resources annotated with `A`. Updates are accepted when either side of the
//! transition is owned, so both the losing and the gaining operator observe a
//! class reassignment.

use crate::config::{ConfigError, ConfigStore};
use crate::constants::{self, keys};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use std::collections::{HashMap, HashSet};

/// A watch event as seen by the filter
#[derive(Debug)]
pub enum WatchEvent<'a, K> {
    Create(&'a K),
    Update { old: &'a K, new: &'a K },
    Delete(&'a K),
    Generic(&'a K),
}

/// Class predicate shared by every controller; immutable after setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    class_name: String,
    annotation_key: String,
}

impl ClassFilter {
    pub fn new(class_name: impl Into<String>, annotation_key: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            annotation_key: annotation_key.into(),
        }
    }

    /// Filter configured by `harbor-class` and `class-annotation`
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        Ok(Self::new(
            store.get_string_or(keys::HARBOR_CLASS, "")?,
            store.get_string_or(keys::CLASS_ANNOTATION, constants::DEFAULT_CLASS_ANNOTATION)?,
        ))
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    /// Whether this operator owns `obj`
    pub fn accepts<K: Resource>(&self, obj: &K) -> bool {
        let annotation = obj
            .annotations()
            .get(&self.annotation_key)
            .map(String::as_str)
            .unwrap_or_default();
        annotation == self.class_name
    }

    /// Whether `event` should reach the reconciler
    pub fn should_process<K: Resource>(&self, event: &WatchEvent<'_, K>) -> bool {
        match event {
            WatchEvent::Create(obj) | WatchEvent::Delete(obj) | WatchEvent::Generic(obj) => {
                self.accepts(*obj)
            }
            WatchEvent::Update { old, new } => self.accepts(*old) || self.accepts(*new),
        }
    }
}

/// Applies a [`ClassFilter`] to a `kube` watcher stream
///
/// The watcher only delivers the latest state of an object, so the tracker
/// remembers whether each object was accepted the last time it was seen and
/// replays that as the old side of an update. A relist replaces the
/// remembered set with the objects it delivered.
#[derive(Debug)]
pub struct ClassTracker {
    filter: ClassFilter,
    last_accepted: HashMap<String, bool>,
    relisted: Option<HashSet<String>>,
}

impl ClassTracker {
    pub fn new(filter: ClassFilter) -> Self {
        Self {
            filter,
            last_accepted: HashMap::new(),
            relisted: None,
        }
    }

    /// Number of objects currently remembered
    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }

    fn key<K: Resource>(obj: &K) -> String {
        format!(
            "{}/{}",
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        )
    }

    /// Decide whether a watcher event passes the filter
    pub fn admit<K: Resource>(&mut self, event: &watcher::Event<K>) -> bool {
        match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                let key = Self::key(obj);
                let accepted = self.filter.accepts(obj);
                if let (watcher::Event::InitApply(_), Some(seen)) = (event, &mut self.relisted) {
                    seen.insert(key.clone());
                }
                match self.last_accepted.insert(key, accepted) {
                    // First sighting behaves like a create
                    None => accepted,
                    Some(previous) => previous || accepted,
                }
            }
            watcher::Event::Delete(obj) => {
                self.last_accepted.remove(&Self::key(obj));
                self.filter
                    .should_process(&WatchEvent::Delete(obj))
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                true
            }
            watcher::Event::InitDone => {
                // Objects missing from the relist were deleted while disconnected
                if let Some(seen) = self.relisted.take() {
                    self.last_accepted.retain(|key, _| seen.contains(key));
                }
                true
            }
        }
    }
}
