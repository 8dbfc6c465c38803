#![forbid(unsafe_code)]

//! Derived state owned by one explorer instance.
//!
//! # Design
//!
//! [`DerivedState`] maps each derived key to a slot. A key that is absent has
//! never been computed, or its deferred is still pending. A key holding `None`
//! is explicitly undefined: its deferred was rejected. Both render the same
//! way (the key is missing from the merged props), which is intentionally
//! lossy: pending, failed and never-computed are indistinguishable to the
//! wrapped unit.
//!
//! The record changes in exactly two ways: wholesale replacement by a
//! construction/reconciliation pass, and per-key [`Patch`]es delivered by
//! resolution callbacks.
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 per replacement and per applied patch.
//! 2. A patch touches exactly one key.
//! 3. Patches apply in the order they are handed to [`DerivedState::apply`];
//!    tickets are recorded but never used to discard a patch.

use std::collections::BTreeMap;

use serde_json::Value;

/// Monotonic identifier assigned to each scheduled resolution callback.
pub type Ticket = u64;

/// How a deferred transform settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Resolved,
    Rejected,
}

impl Settlement {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }
}

/// A single-key update produced when a deferred settles.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub key: String,
    pub ticket: Ticket,
    pub settlement: Settlement,
    /// `Some` for a resolved deferred, `None` for a rejected one.
    pub value: Option<Value>,
}

impl Patch {
    #[must_use]
    pub fn resolved(key: impl Into<String>, ticket: Ticket, value: Value) -> Self {
        Self {
            key: key.into(),
            ticket,
            settlement: Settlement::Resolved,
            value: Some(value),
        }
    }

    #[must_use]
    pub fn rejected(key: impl Into<String>, ticket: Ticket) -> Self {
        Self {
            key: key.into(),
            ticket,
            settlement: Settlement::Rejected,
            value: None,
        }
    }
}

/// What applying a patch did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Version after the patch.
    pub version: u64,
    /// The key was last written by a newer ticket than this patch carries.
    pub overwrote_newer: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    value: Option<Value>,
    /// Ticket of the patch that last wrote this slot, if any.
    written_by: Option<Ticket>,
}

/// Versioned record of derived values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedState {
    slots: BTreeMap<String, Slot>,
    version: u64,
}

impl DerivedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot for `key`: `None` when absent, `Some(None)` when
    /// explicitly undefined.
    #[must_use]
    pub fn slot(&self, key: &str) -> Option<Option<&Value>> {
        self.slots.get(key).map(|s| s.value.as_ref())
    }

    /// Value visible for `key`, collapsing absent and undefined.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key).and_then(|s| s.value.as_ref())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Iterate over every considered key and its slot.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.slots.iter().map(|(k, s)| (k.as_str(), s.value.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Write an immediately computed value. Used while building the next
    /// snapshot; does not bump the version.
    pub(crate) fn set(&mut self, key: &str, value: Value) {
        let slot = Slot {
            value: Some(value),
            written_by: None,
        };
        self.slots.insert(key.to_owned(), slot);
    }

    /// Replace `self` with `next`, carrying the version forward by one.
    pub(crate) fn replace(&mut self, mut next: DerivedState) {
        next.version = self.version + 1;
        *self = next;
    }

    /// Apply a settled deferred's patch.
    pub(crate) fn apply(&mut self, patch: &Patch) -> Applied {
        let overwrote_newer = self
            .slots
            .get(&patch.key)
            .and_then(|s| s.written_by)
            .is_some_and(|t| t > patch.ticket);
        self.slots.insert(
            patch.key.clone(),
            Slot {
                value: patch.value.clone(),
                written_by: Some(patch.ticket),
            },
        );
        self.version += 1;
        Applied {
            version: self.version,
            overwrote_newer,
        }
    }
}
