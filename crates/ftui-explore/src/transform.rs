#![forbid(unsafe_code)]

//! Transform functions and the configuration that names them.
//!
//! A transform computes one derived property from the incoming properties,
//! the previous properties (empty on first mount) and the derived value it
//! produced last time. It answers either immediately ([`Transformed::Ready`])
//! or with a future ([`Transformed::Deferred`]) that settles later.
//!
//! Returning `Err` from the transform itself is a programming error: it
//! aborts the pass that invoked it (see [`crate::ExploreError::Transform`]).
//! A deferred that settles with `Err` is not an error at all; the key simply
//! becomes undefined.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::error::BoxError;
use crate::props::Props;

/// A derived value that is not available yet.
pub type Deferred = LocalBoxFuture<'static, Result<Value, BoxError>>;

/// Signature shared by every transform.
///
/// Arguments are `(incoming, previous, previous_value)`.
pub type TransformFn = dyn Fn(&Props, &Props, Option<&Value>) -> Result<Transformed, BoxError>;

/// Outcome of invoking a transform.
pub enum Transformed {
    Ready(Value),
    Deferred(Deferred),
}

impl Transformed {
    #[must_use]
    pub fn ready(value: impl Into<Value>) -> Self {
        Self::Ready(value.into())
    }

    #[must_use]
    pub fn deferred<F, V, E>(future: F) -> Self
    where
        F: Future<Output = Result<V, E>> + 'static,
        V: Into<Value>,
        E: Into<BoxError>,
    {
        Self::Deferred(
            future
                .map(|r: Result<V, E>| -> Result<Value, BoxError> {
                    r.map(Into::into).map_err(Into::into)
                })
                .boxed_local(),
        )
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl fmt::Debug for Transformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Ordered mapping from derived key to transform.
///
/// Iteration follows insertion order. Registering a key a second time swaps
/// its transform in place without moving it.
#[derive(Default)]
pub struct TransformConfig {
    entries: Vec<(String, Box<TransformFn>)>,
}

impl TransformConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw transform that decides per call between an immediate
    /// and a deferred answer, and may fail synchronously.
    #[must_use]
    pub fn transform<F>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Props, &Props, Option<&Value>) -> Result<Transformed, BoxError> + 'static,
    {
        self.insert(key.into(), Box::new(f));
        self
    }

    /// Register a transform that always answers immediately.
    #[must_use]
    pub fn ready<F, V>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Props, &Props, Option<&Value>) -> V + 'static,
        V: Into<Value>,
    {
        self.transform(key, move |next, prev, value| {
            Ok(Transformed::Ready(f(next, prev, value).into()))
        })
    }

    /// Register a transform that always answers with a future.
    #[must_use]
    pub fn deferred<F, Fut, V, E>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Props, &Props, Option<&Value>) -> Fut + 'static,
        Fut: Future<Output = Result<V, E>> + 'static,
        V: Into<Value>,
        E: Into<BoxError>,
    {
        self.transform(key, move |next, prev, value| {
            Ok(Transformed::deferred(f(next, prev, value)))
        })
    }

    fn insert(&mut self, key: String, f: Box<TransformFn>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = f,
            None => self.entries.push((key, f)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TransformFn> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, f)| f.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TransformFn)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}
