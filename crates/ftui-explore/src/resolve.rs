#![forbid(unsafe_code)]

//! Resolution callbacks: bridging deferred transform results back into the
//! owning explorer.
//!
//! Each deferred is spawned on the host's local executor wrapped in a small
//! task that awaits it and turns the outcome into a [`Patch`]. The patch is
//! not applied from inside the task. It is posted to the owner's inbox and
//! applied when the owner drains it, so every mutation of the derived state
//! happens on the owner, in the order the deferreds settled.
//!
//! # Failure Modes
//!
//! - **Rejected deferred**: becomes a `Rejected` patch (value undefined). The
//!   rejection reason is dropped.
//! - **Owner dropped first**: the inbox is gone, so the send fails and the
//!   patch is discarded.
//! - **Deferred never settles**: the task stays parked on the executor; there
//!   is no timeout.
//! - **Executor dropped first**: the task is dropped unsettled and posts
//!   nothing; it no longer counts as live.

use std::cell::Cell;
use std::rc::Rc;

use futures::channel::mpsc::UnboundedSender;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::error::{ExploreError, Result};
use crate::state::{Patch, Ticket};
use crate::transform::Deferred;

/// Spawns resolution callbacks for one explorer and hands out tickets.
pub(crate) struct Resolver {
    spawner: Box<dyn LocalSpawn>,
    outbox: UnboundedSender<Patch>,
    last_ticket: Ticket,
    live: Rc<Cell<usize>>,
}

/// Held by a spawned callback for as long as the executor keeps it.
struct LiveCallback(Rc<Cell<usize>>);

impl LiveCallback {
    fn new(live: &Rc<Cell<usize>>) -> Self {
        live.set(live.get() + 1);
        Self(Rc::clone(live))
    }
}

impl Drop for LiveCallback {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Resolver {
    pub(crate) fn new(spawner: Box<dyn LocalSpawn>, outbox: UnboundedSender<Patch>) -> Self {
        Self {
            spawner,
            outbox,
            last_ticket: 0,
            live: Rc::default(),
        }
    }

    /// Spawn a resolution callback for `key`.
    pub(crate) fn schedule(&mut self, key: String, deferred: Deferred) -> Result<Ticket> {
        let ticket = self.last_ticket + 1;
        let guard = LiveCallback::new(&self.live);
        let task = resolve_to_key(key.clone(), ticket, deferred, self.outbox.clone(), guard);
        if let Err(source) = self.spawner.spawn_local(task) {
            return Err(ExploreError::Spawn { key, source });
        }
        self.last_ticket = ticket;
        tracing::trace!(message = "explore.schedule", key = %key, ticket);
        Ok(ticket)
    }

    #[must_use]
    pub(crate) fn last_ticket(&self) -> Ticket {
        self.last_ticket
    }

    /// Spawned callbacks the executor still holds, settled or not.
    #[must_use]
    pub(crate) fn live(&self) -> usize {
        self.live.get()
    }
}

async fn resolve_to_key(
    key: String,
    ticket: Ticket,
    deferred: Deferred,
    outbox: UnboundedSender<Patch>,
    _live: LiveCallback,
) {
    let patch = match deferred.await {
        Ok(value) => Patch::resolved(key, ticket, value),
        Err(_) => Patch::rejected(key, ticket),
    };
    if let Err(err) = outbox.unbounded_send(patch) {
        let patch = err.into_inner();
        tracing::trace!(
            message = "explore.patch.orphaned",
            key = %patch.key,
            ticket = patch.ticket
        );
    }
}
