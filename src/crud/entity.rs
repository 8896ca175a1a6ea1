//! Persisted entity contract and the exact-match filter predicate used by search.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Key: Clone
        + Ord
        + fmt::Debug
        + fmt::Display
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + 'static;

    /// Field holding the primary key in the entity's serialized form.
    const KEY_FIELD: &'static str = "key";

    fn key(&self) -> Option<Self::Key>;

    fn with_key(self, key: Self::Key) -> Self;
}

/// Conjunction of `field = value` conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<(String, Value)>,
}

impl Criteria {
    pub fn new() -> Self {
        Criteria::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v))
    }

    /// True when every condition holds on the serialized record. Empty criteria match all.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

impl From<Map<String, Value>> for Criteria {
    fn from(map: Map<String, Value>) -> Self {
        Criteria {
            conditions: map.into_iter().collect(),
        }
    }
}
