#![forbid(unsafe_code)]

//! Derived-property decorator for FrankenTUI components.
//!
//! `explore(config).wrap(unit)` produces a component that overlays derived
//! properties onto the properties its host passes in. Each derived property
//! comes from a transform that answers immediately or with a future.
//!
//! - [`TransformConfig`]: ordered mapping from derived key to transform.
//! - [`Explore`] / [`Explored`]: the reusable decorator and a decorated unit.
//! - [`Explorer`]: one mounted instance owning base props and derived state.
//! - [`DerivedState`]: versioned record of derived values, patched by
//!   resolution callbacks.
//!
//! # Architecture
//!
//! Everything is single-threaded. Deferred transforms are spawned on a
//! host-supplied [`LocalSpawn`]er; when one settles its callback posts a
//! [`Patch`] to the owning explorer's inbox, and the explorer applies it on
//! [`Explorer::settle`], [`Explorer::next_patch`] or at the start of the
//! next [`Explorer::receive_props`].
//!
//! # Invariants
//!
//! 1. Merged props are `base ∪ derived` with derived keys winning, rebuilt
//!    on every render; neither input is mutated.
//! 2. A failed synchronous transform aborts its pass without side effects on
//!    props or state.
//! 3. A rejected deferred leaves its key undefined; the rejection never
//!    reaches the wrapped unit.
//! 4. Patches apply in settlement order. The last deferred to settle wins,
//!    even when it was produced by an older props event. A patch posted
//!    before a props event is applied before that event's pass.

pub mod error;
pub mod explorer;
pub mod presentation;
pub mod props;
mod resolve;
pub mod state;
pub mod transform;

pub use error::{BoxError, ExploreError, Result};
pub use explorer::{Explore, Explored, Explorer, explore};
pub use futures::task::LocalSpawn;
pub use presentation::{Named, Presentation};
pub use props::Props;
pub use state::{DerivedState, Patch, Settlement, Ticket};
pub use transform::{Deferred, TransformConfig, TransformFn, Transformed};
