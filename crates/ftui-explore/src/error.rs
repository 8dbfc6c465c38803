#![forbid(unsafe_code)]

//! Error types for the explore decorator.

use futures::task::SpawnError;
use thiserror::Error;

/// Boxed error carried by failing transforms and rejected deferreds.
///
/// Any error type converts into it with `?` or `.into()`, including plain
/// strings (`"boom".into()`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, ExploreError>;

#[derive(Debug, Error)]
pub enum ExploreError {
    /// A transform failed synchronously. The pass that invoked it was
    /// aborted and nothing it computed was kept.
    #[error("transform `{key}` failed: {source}")]
    Transform {
        key: String,
        #[source]
        source: BoxError,
    },

    /// The host spawner refused a resolution callback.
    #[error("failed to schedule resolution for `{key}`: {source}")]
    Spawn {
        key: String,
        #[source]
        source: SpawnError,
    },
}

impl ExploreError {
    /// Derived key whose transform or resolution caused this error.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Transform { key, .. } | Self::Spawn { key, .. } => key,
        }
    }

    #[must_use]
    pub fn transform(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Transform {
            key: key.into(),
            source: source.into(),
        }
    }
}
