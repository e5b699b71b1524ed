// src/core/registry.rs

use crate::models::{Command, Network};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A name-indexed collection that remembers declaration order.
///
/// `names()` is a derived view, rebuilt by `reindex` after every structural change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
    names: Vec<String>,
}

pub type Networks = Registry<Network>;
pub type Commands = Registry<Command>;
pub type Targets = Registry<Vec<String>>;

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            names: Vec::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks an entity up by name. Absence is a normal outcome.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index
            .get(name)
            .and_then(|&i| self.entries.get(i))
            .map(|(_, value)| value)
    }

    /// Like [`Registry::get`], but also hands out the stored name.
    pub fn entry(&self, name: &str) -> Option<(&str, &T)> {
        self.index
            .get(name)
            .and_then(|&i| self.entries.get(i))
            .map(|(stored, value)| (stored.as_str(), value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Inserts or replaces `name`. A replaced entity keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        self.upsert(name.into(), value);
        self.reindex();
    }

    /// Folds `other` on top of `self`: same-named entities are overwritten,
    /// new ones are appended in `other`'s order.
    pub fn merge_from(&mut self, other: Self) {
        for (name, value) in other.entries {
            if self.contains(&name) {
                log::trace!("Overriding '{}' from an included Supfile", name);
            }
            self.upsert(name, value);
        }
        self.reindex();
    }

    fn upsert(&mut self, name: String, value: T) {
        match self.index.get(&name).and_then(|&i| self.entries.get_mut(i)) {
            Some(slot) => slot.1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        self.names = self.entries.iter().map(|(name, _)| name.clone()).collect();
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Registry<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RegistryVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for RegistryVisitor<T> {
            type Value = Registry<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of names to definitions")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Registry<T>, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut registry = Registry::new();
                while let Some((name, value)) = map.next_entry::<String, T>()? {
                    registry.upsert(name, value);
                }
                registry.reindex();
                Ok(registry)
            }
        }

        deserializer.deserialize_map(RegistryVisitor(PhantomData))
    }
}
