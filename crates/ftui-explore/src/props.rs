#![forbid(unsafe_code)]

//! Property bags passed into and out of an explored component.
//!
//! [`Props`] is a string-keyed map of JSON values. The host hands base
//! properties to the explorer; the wrapped unit receives the shallow merge of
//! those base properties with the derived state (see [`Props::merged`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::state::DerivedState;

/// String-keyed property bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(Map<String, Value>);

impl Props {
    /// Empty property bag, the "previous properties" seen on first mount.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value. Non-object values yield `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Truthiness of a property, following the loose rules UI code usually
    /// applies to flags: absent, `null`, `false`, `0` and `""` are falsy.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_) | Value::Object(_)) => true,
        }
    }

    /// Shallow-overlay `other` onto a copy of `self`; keys in `other` win.
    #[must_use]
    pub fn overlay(&self, other: &Props) -> Props {
        let mut out = self.clone();
        for (key, value) in other.iter() {
            out.0.insert(key.clone(), value.clone());
        }
        out
    }

    /// Fresh bag holding `base` overlaid by `derived`.
    ///
    /// Derived keys win on collision. A derived key that is explicitly
    /// undefined (a rejected deferred) shadows the base key, so the merged bag
    /// does not contain it. Keys the derived state has never seen fall through
    /// to the base. Neither input is modified.
    #[must_use]
    pub fn merged(base: &Props, derived: &DerivedState) -> Props {
        let mut out = base.clone();
        for (key, slot) in derived.iter() {
            match slot {
                Some(value) => {
                    out.0.insert(key.to_owned(), value.clone());
                }
                None => {
                    out.0.remove(key);
                }
            }
        }
        out
    }

    /// Borrow the underlying JSON map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Props {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl std::fmt::Display for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(std::fmt::Error),
        }
    }
}
