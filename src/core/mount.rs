//! # Chat Mount
//!
//! Everything one chat view owns while it is on screen: the subscription
//! guards and the background tasks feeding it. Tearing down aborts the tasks
//! and releases the guards, once.
//!
//! `Mount` is a cheap handle. Clones share state, so a task that opens a
//! subscription can hand the guard back after the view has moved on; a guard
//! arriving at a torn-down mount is released on the spot.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio::task::AbortHandle;

use crate::backend::SubscriptionGuard;
use crate::core::state::MountId;

#[derive(Default)]
struct Inner {
    guards: Vec<SubscriptionGuard>,
    tasks: Vec<AbortHandle>,
    torn_down: bool,
}

#[derive(Clone)]
pub struct Mount {
    id: MountId,
    inner: Arc<Mutex<Inner>>,
}

impl Mount {
    pub fn new(id: MountId) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn id(&self) -> MountId {
        self.id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps `guard` alive until teardown. Returns `false` (and releases the
    /// guard) if the mount is already gone.
    pub fn hold(&self, mut guard: SubscriptionGuard) -> bool {
        let mut inner = self.lock();
        if inner.torn_down {
            drop(inner);
            guard.release();
            return false;
        }
        inner.guards.push(guard);
        true
    }

    /// Aborts `task` on teardown, or right away if teardown already happened.
    pub fn track(&self, task: AbortHandle) {
        let mut inner = self.lock();
        if inner.torn_down {
            task.abort();
        } else {
            inner.tasks.push(task);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().guards.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }

    /// Aborts the mount's tasks and releases its subscriptions.
    /// Returns `false` if the mount was already torn down.
    pub fn teardown(&self) -> bool {
        let (tasks, guards) = {
            let mut inner = self.lock();
            if inner.torn_down {
                return false;
            }
            inner.torn_down = true;
            (
                std::mem::take(&mut inner.tasks),
                std::mem::take(&mut inner.guards),
            )
        };
        for task in tasks {
            task.abort();
        }
        for mut guard in guards {
            guard.release();
        }
        debug!("Mount {} torn down", self.id.get());
        true
    }
}
