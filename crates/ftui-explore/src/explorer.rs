#![forbid(unsafe_code)]

//! The explore decorator and its per-instance state machine.
//!
//! # Usage
//!
//! ```
//! use ftui_explore::{Props, TransformConfig, explore};
//! use futures::executor::LocalPool;
//!
//! let config = TransformConfig::new()
//!     .ready("flag", |next, _, _| if next.is_truthy("x") { "yes" } else { "no" });
//! let explored = explore(config).wrap(|props: &Props| {
//!     let flag = props.get("flag").and_then(|v| v.as_str()).unwrap_or("?");
//!     format!("flag={flag}")
//! });
//!
//! let pool = LocalPool::new();
//! let mut explorer = explored
//!     .mount(Props::new().with("x", false), pool.spawner())
//!     .expect("mount");
//! assert_eq!(explorer.render(), "flag=no");
//!
//! explorer.receive_props(Props::new().with("x", true)).expect("reconcile");
//! assert_eq!(explorer.render(), "flag=yes");
//! ```
//!
//! # Lifecycle
//!
//! 1. **Mount** runs every transform against `(initial, {}, None)`. Immediate
//!    answers land in the state; deferred ones are spawned and their keys stay
//!    absent.
//! 2. **Receive props** first applies every patch already posted, then runs
//!    every transform against `(next, current, state[key])`. Immediate
//!    answers overwrite their key; deferred keys keep their current value
//!    until a patch arrives.
//! 3. **Settle** applies patches posted by resolution callbacks, in the order
//!    the deferreds settled. The last deferred to settle wins, even if an
//!    older props event produced it.
//! 4. **Render** hands `base ∪ derived` (derived wins) to the wrapped unit.
//!
//! # Failure Modes
//!
//! - **Transform fails synchronously**: the pass is aborted with
//!   [`ExploreError::Transform`]. Patches posted before the event are still
//!   applied; beyond that, props, state and version are untouched and no
//!   deferred from the aborted pass is spawned.
//! - **Spawner refuses a task**: [`ExploreError::Spawn`]; deferreds spawned
//!   earlier in the same pass still settle and patch later, but the pass's
//!   state is not committed.
//! - **Executor dropped with deferreds pending**: their callbacks never run.
//!   [`Explorer::next_patch`] notices once every callback is gone and returns
//!   `None` instead of waiting.

use std::fmt;
use std::rc::Rc;

use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::task::LocalSpawn;
use futures::{FutureExt, StreamExt};

use crate::error::{ExploreError, Result};
use crate::presentation::Presentation;
use crate::props::Props;
use crate::resolve::Resolver;
use crate::state::{DerivedState, Patch};
use crate::transform::{Deferred, TransformConfig, Transformed};

/// Wrap-once factory: bind a transform configuration, then apply it to any
/// number of presentation units.
pub fn explore(config: TransformConfig) -> Explore {
    Explore {
        config: Rc::new(config),
    }
}

/// A transform configuration ready to decorate presentation units.
///
/// Cloning shares the configuration.
#[derive(Debug, Clone)]
pub struct Explore {
    config: Rc<TransformConfig>,
}

impl Explore {
    /// Decorate `unit`, producing a component constructor.
    #[must_use]
    pub fn wrap<U: Presentation>(&self, unit: U) -> Explored<U> {
        Explored {
            config: Rc::clone(&self.config),
            unit: Rc::new(unit),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }
}

/// A decorated presentation unit. Each [`mount`](Explored::mount) creates an
/// independent [`Explorer`].
pub struct Explored<U> {
    config: Rc<TransformConfig>,
    unit: Rc<U>,
}

impl<U> Clone for Explored<U> {
    fn clone(&self) -> Self {
        Self {
            config: Rc::clone(&self.config),
            unit: Rc::clone(&self.unit),
        }
    }
}

impl<U: Presentation> fmt::Debug for Explored<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explored")
            .field("name", &self.display_name())
            .field("config", &self.config)
            .finish()
    }
}

impl<U: Presentation> Explored<U> {
    /// `Explored(<inner display name>)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("Explored({})", self.unit.display_name())
    }

    /// Construct an instance with its initial properties.
    ///
    /// Deferred transforms are spawned on `spawner`; they make progress only
    /// when the host drives that executor.
    pub fn mount<S>(&self, props: Props, spawner: S) -> Result<Explorer<U>>
    where
        S: LocalSpawn + 'static,
    {
        Explorer::mount(
            Rc::clone(&self.config),
            Rc::clone(&self.unit),
            props,
            Box::new(spawner),
        )
    }
}

/// Outcome of running every transform once.
struct Pass {
    state: DerivedState,
    deferred: Vec<(String, Deferred)>,
}

/// Run every transform against `(next, prev, prev_state[key])`.
///
/// The returned state starts as a copy of `prev_state`, so deferred keys keep
/// whatever value they had.
fn run_pass(
    config: &TransformConfig,
    next: &Props,
    prev: &Props,
    prev_state: &DerivedState,
) -> Result<Pass> {
    let mut state = prev_state.clone();
    let mut deferred = Vec::new();
    for (key, transform) in config.iter() {
        let out = transform(next, prev, prev_state.get(key))
            .map_err(|source| ExploreError::transform(key, source))?;
        match out {
            Transformed::Ready(value) => state.set(key, value),
            Transformed::Deferred(d) => deferred.push((key.to_owned(), d)),
        }
    }
    Ok(Pass { state, deferred })
}

/// One mounted, decorated unit: owns its base props and derived state.
pub struct Explorer<U> {
    config: Rc<TransformConfig>,
    unit: Rc<U>,
    display_name: String,
    props: Props,
    state: DerivedState,
    resolver: Resolver,
    inbox: UnboundedReceiver<Patch>,
    in_flight: usize,
}

impl<U: Presentation> Explorer<U> {
    fn mount(
        config: Rc<TransformConfig>,
        unit: Rc<U>,
        props: Props,
        spawner: Box<dyn LocalSpawn>,
    ) -> Result<Self> {
        let display_name = format!("Explored({})", unit.display_name());
        let span = tracing::debug_span!(
            "explore.initialize",
            component = %display_name,
            keys = config.len(),
            deferred = tracing::field::Empty
        );
        let _guard = span.enter();

        let (outbox, inbox) = mpsc::unbounded();
        let mut explorer = Self {
            config,
            unit,
            display_name,
            props: Props::new(),
            state: DerivedState::new(),
            resolver: Resolver::new(spawner, outbox),
            inbox,
            in_flight: 0,
        };
        let pass = run_pass(&explorer.config, &props, &Props::new(), &DerivedState::new())?;
        span.record("deferred", pass.deferred.len());
        explorer.spawn_all(pass.deferred)?;
        explorer.state = pass.state;
        explorer.props = props;
        Ok(explorer)
    }

    /// Properties-received event: reconcile derived state against `next`,
    /// then adopt `next` as the base properties.
    ///
    /// Patches posted before the event are applied first, so transforms see
    /// every value that settled before this update and no older patch lands
    /// on top of what this pass writes.
    pub fn receive_props(&mut self, next: Props) -> Result<()> {
        let span = tracing::debug_span!(
            "explore.reconcile",
            component = %self.display_name,
            keys = self.config.len(),
            deferred = tracing::field::Empty
        );
        let _guard = span.enter();

        self.settle();
        let pass = run_pass(&self.config, &next, &self.props, &self.state)?;
        span.record("deferred", pass.deferred.len());
        self.spawn_all(pass.deferred)?;
        self.state.replace(pass.state);
        self.props = next;
        Ok(())
    }

    /// Shallow-merge `partial` over the current base properties and dispatch
    /// the result as a properties-received event.
    pub fn update_props(&mut self, partial: Props) -> Result<()> {
        let next = self.props.overlay(&partial);
        self.receive_props(next)
    }

    /// Render the wrapped unit with freshly merged properties.
    pub fn render(&self) -> U::View {
        self.unit.render(&self.merged_props())
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl<U> Explorer<U> {
    fn spawn_all(&mut self, deferred: Vec<(String, Deferred)>) -> Result<()> {
        for (key, d) in deferred {
            self.resolver.schedule(key, d)?;
            self.in_flight += 1;
        }
        Ok(())
    }

    /// Apply every patch already posted to this instance. Returns how many
    /// were applied; non-zero means the view is stale.
    pub fn settle(&mut self) -> usize {
        let mut applied = 0;
        while let Some(Some(patch)) = self.inbox.next().now_or_never() {
            self.apply(&patch);
            applied += 1;
        }
        applied
    }

    /// Wait for the next resolution callback, apply its patch and return it.
    ///
    /// Returns `None` at once when nothing is in flight, or when every
    /// pending callback was dropped by its executor before settling (those
    /// stop counting as in flight). The second check happens when the call
    /// starts: an executor dropped while this future is parked leaves it
    /// parked. Otherwise it waits as long as the deferred does; there is no
    /// timeout.
    pub async fn next_patch(&mut self) -> Option<Patch> {
        if self.in_flight == 0 {
            return None;
        }
        let patch = if self.resolver.live() == 0 {
            self.inbox.next().now_or_never().flatten()
        } else {
            self.inbox.next().await
        };
        let Some(patch) = patch else {
            self.in_flight = 0;
            return None;
        };
        self.apply(&patch);
        Some(patch)
    }

    fn apply(&mut self, patch: &Patch) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let applied = self.state.apply(patch);
        if applied.overwrote_newer {
            tracing::trace!(
                message = "explore.patch.stale",
                key = %patch.key,
                ticket = patch.ticket
            );
        }
        tracing::debug!(
            message = "explore.patch",
            key = %patch.key,
            ticket = patch.ticket,
            outcome = patch.settlement.as_str(),
            version = applied.version
        );
    }

    /// Base properties as last received from the host.
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    #[must_use]
    pub fn state(&self) -> &DerivedState {
        &self.state
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.version()
    }

    /// Resolution callbacks spawned but not yet applied.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Total resolution callbacks spawned over this instance's lifetime.
    #[must_use]
    pub fn scheduled(&self) -> u64 {
        self.resolver.last_ticket()
    }

    /// `base ∪ derived`, derived keys winning. Built fresh on every call.
    #[must_use]
    pub fn merged_props(&self) -> Props {
        Props::merged(&self.props, &self.state)
    }
}

impl<U> fmt::Debug for Explorer<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explorer")
            .field("name", &self.display_name)
            .field("props", &self.props)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::presentation::Named;
    use futures::channel::oneshot;
    use futures::executor::{LocalPool, LocalSpawner};
    use futures::task::{LocalFutureObj, SpawnError};
    use serde_json::{Value, json};
    use std::cell::{Cell, RefCell};

    /// Spawner that accepts `budget` tasks, then reports shutdown.
    struct Budgeted {
        inner: LocalSpawner,
        budget: Cell<usize>,
    }

    impl LocalSpawn for Budgeted {
        fn spawn_local_obj(
            &self,
            future: LocalFutureObj<'static, ()>,
        ) -> std::result::Result<(), SpawnError> {
            let left = self.budget.get();
            if left == 0 {
                return Err(SpawnError::shutdown());
            }
            self.budget.set(left - 1);
            self.inner.spawn_local_obj(future)
        }
    }

    fn echo() -> impl Fn(&Props) -> Props {
        |props: &Props| props.clone()
    }

    #[test]
    fn empty_config_forwards_nothing() {
        let pool = LocalPool::new();
        let explorer = explore(TransformConfig::new())
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        assert!(explorer.render().is_empty());
        assert!(explorer.state().is_empty());
    }

    #[test]
    fn forwards_basic_props() {
        let pool = LocalPool::new();
        let base = Props::new().with("passes", true);
        let explorer = explore(TransformConfig::new())
            .wrap(echo())
            .mount(base.clone(), pool.spawner())
            .expect("mount");
        assert_eq!(explorer.render(), base);
    }

    #[test]
    fn initialize_passes_empty_previous() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let config = TransformConfig::new().ready("k", move |next, prev, value| {
            log.borrow_mut()
                .push((next.clone(), prev.clone(), value.cloned()));
            1
        });
        let pool = LocalPool::new();
        let initial = Props::new().with("a", 1);
        let _explorer = explore(config)
            .wrap(echo())
            .mount(initial.clone(), pool.spawner())
            .expect("mount");
        assert_eq!(*seen.borrow(), vec![(initial, Props::new(), None)]);
    }

    #[test]
    fn reconcile_passes_previous_props_and_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let config = TransformConfig::new().ready("count", move |next, prev, value| {
            log.borrow_mut().push((prev.clone(), value.cloned()));
            let n = value.and_then(Value::as_i64).unwrap_or(0);
            let bump = next.get("step").and_then(Value::as_i64).unwrap_or(1);
            n + bump
        });
        let pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new().with("step", 1), pool.spawner())
            .expect("mount");
        assert_eq!(explorer.state().get("count"), Some(&json!(1)));

        explorer
            .receive_props(Props::new().with("step", 5))
            .expect("reconcile");
        assert_eq!(explorer.state().get("count"), Some(&json!(6)));

        let seen = seen.borrow();
        assert_eq!(seen[1], (Props::new().with("step", 1), Some(json!(1))));
    }

    #[test]
    fn deferred_key_keeps_stale_value_until_patch() {
        let gates: Rc<RefCell<Vec<oneshot::Sender<Value>>>> = Rc::default();
        let gates_in = Rc::clone(&gates);
        let config = TransformConfig::new().deferred("kind", move |_, _, _| {
            let (tx, rx) = oneshot::channel::<Value>();
            gates_in.borrow_mut().push(tx);
            async move { rx.await.map_err(BoxError::from) }
        });

        let mut pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        assert_eq!(explorer.state().slot("kind"), None);

        gates.borrow_mut().remove(0).send(json!("first")).expect("send");
        pool.run_until_stalled();
        assert_eq!(explorer.settle(), 1);
        assert_eq!(explorer.render().get("kind"), Some(&json!("first")));

        explorer.receive_props(Props::new().with("x", 1)).expect("reconcile");
        // Stale value survives while the new deferred is pending.
        assert_eq!(explorer.render().get("kind"), Some(&json!("first")));
        assert_eq!(explorer.in_flight(), 1);

        gates.borrow_mut().remove(0).send(json!("second")).expect("send");
        pool.run_until_stalled();
        explorer.settle();
        assert_eq!(explorer.render().get("kind"), Some(&json!("second")));
        assert_eq!(explorer.in_flight(), 0);
    }

    #[test]
    fn failing_transform_aborts_reconcile() {
        let config = TransformConfig::new()
            .deferred("slow", |_, _, _| async { Ok::<_, BoxError>(1) })
            .transform("strict", |next, _, _| {
                if next.contains_key("bad") {
                    Err("bad props".into())
                } else {
                    Ok(Transformed::ready("ok"))
                }
            });
        let pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        let version = explorer.version();
        let scheduled = explorer.scheduled();

        let err = explorer
            .receive_props(Props::new().with("bad", true))
            .expect_err("strict transform fails");
        assert_eq!(err.key(), "strict");
        assert_eq!(explorer.version(), version);
        assert_eq!(explorer.props(), &Props::new());
        assert_eq!(explorer.scheduled(), scheduled);
    }

    #[test]
    fn failing_transform_aborts_mount() {
        let config = TransformConfig::new().transform("boom", |_, _, _| Err("nope".into()));
        let pool = LocalPool::new();
        let err = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect_err("mount fails");
        assert!(matches!(err, ExploreError::Transform { .. }));
    }

    #[test]
    fn reconcile_applies_settled_patches_first() {
        let seen: Rc<RefCell<Vec<Option<Value>>>> = Rc::default();
        let log = Rc::clone(&seen);
        let calls = Rc::new(Cell::new(0));
        let config = TransformConfig::new().transform("v", move |_, _, value| {
            log.borrow_mut().push(value.cloned());
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Ok(Transformed::deferred(async {
                    Ok::<_, BoxError>("async-from-mount")
                }))
            } else {
                Ok(Transformed::ready("sync-from-update"))
            }
        });
        let mut pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        pool.run_until_stalled();

        explorer.receive_props(Props::new().with("x", 1)).expect("reconcile");
        assert_eq!(
            seen.borrow().last().cloned().flatten(),
            Some(json!("async-from-mount"))
        );
        assert_eq!(explorer.in_flight(), 0);
        assert_eq!(explorer.settle(), 0);
        assert_eq!(explorer.state().get("v"), Some(&json!("sync-from-update")));
    }

    #[test]
    fn spawn_refusal_keeps_previous_pass() {
        let config = TransformConfig::new()
            .ready("size", |next, _, _| next.len())
            .deferred("a", |_, _, _| async { Ok::<_, BoxError>("a") })
            .deferred("b", |_, _, _| async { Ok::<_, BoxError>("b") });
        let mut pool = LocalPool::new();
        let spawner = Budgeted {
            inner: pool.spawner(),
            budget: Cell::new(3),
        };
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), spawner)
            .expect("mount");
        assert_eq!(explorer.in_flight(), 2);
        let version = explorer.version();
        let state = explorer.state().clone();

        let err = explorer
            .receive_props(Props::new().with("x", 1))
            .expect_err("spawner runs out");
        assert!(matches!(err, ExploreError::Spawn { ref key, .. } if key == "b"));
        assert_eq!(explorer.props(), &Props::new());
        assert_eq!(explorer.version(), version);
        assert_eq!(explorer.state(), &state);
        assert_eq!(explorer.in_flight(), 3);
        assert_eq!(explorer.scheduled(), 3);

        // The deferred that did get spawned still patches later.
        pool.run_until_stalled();
        assert_eq!(explorer.settle(), 3);
        assert_eq!(explorer.in_flight(), 0);
        assert_eq!(explorer.state().get("size"), Some(&json!(0)));
    }

    #[test]
    fn update_props_merges_partial() {
        let config = TransformConfig::new().ready("both", |next, _, _| {
            next.is_truthy("passes") && next.is_truthy("foo")
        });
        let pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new().with("passes", true), pool.spawner())
            .expect("mount");
        explorer
            .update_props(Props::new().with("foo", "bar"))
            .expect("update");
        let out = explorer.render();
        assert_eq!(out.get("passes"), Some(&json!(true)));
        assert_eq!(out.get("foo"), Some(&json!("bar")));
        assert_eq!(out.get("both"), Some(&json!(true)));
    }

    #[test]
    fn next_patch_returns_none_when_idle() {
        let pool = LocalPool::new();
        let mut explorer = explore(TransformConfig::new())
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        assert!(futures::executor::block_on(explorer.next_patch()).is_none());
    }

    #[test]
    fn next_patch_drives_to_resolution() {
        let config =
            TransformConfig::new().deferred("v", |_, _, _| async { Ok::<_, BoxError>(42) });
        let mut pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        let patch = pool.run_until(explorer.next_patch()).expect("patch");
        assert_eq!(patch.key, "v");
        assert_eq!(explorer.render().get("v"), Some(&json!(42)));
    }

    #[test]
    fn next_patch_gives_up_when_executor_is_dropped() {
        let (_gate, gate_rx) = oneshot::channel::<Value>();
        let gate_rx = RefCell::new(Some(gate_rx));
        let config = TransformConfig::new().deferred("v", move |_, _, _| {
            let rx = gate_rx.borrow_mut().take();
            async move {
                match rx {
                    Some(rx) => rx.await.map_err(BoxError::from),
                    None => Err(BoxError::from("gate already used")),
                }
            }
        });
        let pool = LocalPool::new();
        let mut explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        assert_eq!(explorer.in_flight(), 1);

        drop(pool);
        assert!(futures::executor::block_on(explorer.next_patch()).is_none());
        assert_eq!(explorer.in_flight(), 0);
        assert_eq!(explorer.state().slot("v"), None);
    }

    #[test]
    fn explore_shares_config_across_units() {
        let decorator = explore(
            TransformConfig::new()
                .ready("first", |_, _, _| 1)
                .ready("second", |_, _, _| 2),
        );
        let keys: Vec<&str> = decorator.config().keys().collect();
        assert_eq!(keys, ["first", "second"]);

        let clone = decorator.clone();
        assert!(std::ptr::eq(decorator.config(), clone.config()));
    }

    #[test]
    fn display_name_wraps_inner() {
        let explored = explore(TransformConfig::new()).wrap(Named::new("Basic", echo()));
        assert_eq!(explored.display_name(), "Explored(Basic)");
        let pool = LocalPool::new();
        let explorer = explored.mount(Props::new(), pool.spawner()).expect("mount");
        assert_eq!(explorer.display_name(), "Explored(Basic)");

        let anonymous = explore(TransformConfig::new()).wrap(echo());
        assert_eq!(anonymous.display_name(), "Explored(Component)");
    }

    #[test]
    fn debug_output_mentions_state() {
        let config = TransformConfig::new().ready("flag", |_, _, _| "yes");
        let pool = LocalPool::new();
        let explorer = explore(config)
            .wrap(echo())
            .mount(Props::new(), pool.spawner())
            .expect("mount");
        let dbg = format!("{explorer:?}");
        assert!(dbg.contains("Explorer"));
        assert!(dbg.contains("flag"));
    }
}
