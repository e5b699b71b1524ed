//! # Ordered Environment List
//!
//! `EnvList` maps a YAML mapping onto an insertion-ordered list of variables so
//! that later values can reference earlier ones (`MIDDLE: $BEGINNING-middle`).
//! Updating an existing key keeps its position; new keys are appended.

use crate::core::commons::{Scalar, wrap_value};
use crate::core::evaluator::ExpressionEvaluator;
use crate::system::executor::ExecutionError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("resolving env var {key} failed: {source}")]
    Resolve {
        key: String,
        #[source]
        source: ExecutionError,
    },
}

/// A single environment variable. The key never changes once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    key: String,
    value: String,
}

impl EnvVar {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renders the variable as a shell `export` statement.
    pub fn as_export(&self) -> String {
        format!("export {}={};", self.key, wrap_value(&self.value))
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvList {
    vars: Vec<EnvVar>,
}

impl EnvList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`. An existing key is updated in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|v| v.key == key) {
            Some(existing) => existing.value = value,
            None => self.vars.push(EnvVar { key, value }),
        }
    }

    /// Returns the value for `key`, or an empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.lookup(key).unwrap_or("")
    }

    /// Like [`EnvList::get`], but distinguishes a missing key.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.key == key)
            .map(|v| v.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvVar> {
        self.vars.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|v| v.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Applies every entry of `other`, in its order, with the update-or-append rule.
    pub fn extend_from(&mut self, other: &Self) {
        for var in &other.vars {
            self.set(var.key.clone(), var.value.clone());
        }
    }

    /// Renders the whole list as `export FOO="bar"; export BAR="baz"; `.
    pub fn as_export(&self) -> String {
        let mut exports = String::with_capacity(self.vars.len() * 32);
        for var in &self.vars {
            exports.push_str(&var.as_export());
            exports.push(' ');
        }
        exports
    }

    /// Resolves every raw value in list order.
    ///
    /// Each value is evaluated against the entries already resolved before it,
    /// so evaluation is strictly sequential. The first failure aborts.
    pub fn resolve_values(&mut self, evaluator: &dyn ExpressionEvaluator) -> Result<(), EnvError> {
        let mut resolved = Self::new();
        for var in &self.vars {
            log::trace!("Resolving env var {}", var.key);
            let value = evaluator
                .evaluate(&var.value, &resolved)
                .map_err(|source| EnvError::Resolve {
                    key: var.key.clone(),
                    source,
                })?;
            resolved.set(var.key.clone(), value);
        }
        *self = resolved;
        Ok(())
    }
}

impl<'de> Deserialize<'de> for EnvList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EnvListVisitor;

        impl<'de> Visitor<'de> for EnvListVisitor {
            type Value = EnvList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of environment variables")
            }

            fn visit_map<A>(self, mut map: A) -> Result<EnvList, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut list = EnvList::new();
                while let Some((Scalar(key), Scalar(value))) = map.next_entry::<Scalar, Scalar>()? {
                    list.set(key, value);
                }
                Ok(list)
            }

            fn visit_unit<E>(self) -> Result<EnvList, E> {
                Ok(EnvList::new())
            }
        }

        deserializer.deserialize_any(EnvListVisitor)
    }
}
