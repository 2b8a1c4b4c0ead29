//! # Subscriptions
//!
//! A live change feed is an owned handle. Whoever holds the
//! [`SubscriptionGuard`] holds the server-side listener; releasing it (or
//! dropping it) deregisters the listener. Release runs at most once no matter
//! how often it is requested.
//!
//! ```text
//! Subscription
//! ├── events: mpsc::Receiver<ChangeEvent>   // consumed by a forwarder task
//! └── guard: SubscriptionGuard              // kept by the mounted view
//! ```

use log::debug;
use tokio::sync::mpsc;

use super::types::ChangeEvent;

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Releases the server-side listener exactly once, on request or on drop.
pub struct SubscriptionGuard {
    topic: String,
    release: Option<ReleaseFn>,
}

impl SubscriptionGuard {
    pub fn new(topic: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            topic: topic.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Deregisters the listener. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(release) => {
                debug!("Releasing subscription {}", self.topic);
                release();
                true
            }
            None => false,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("topic", &self.topic)
            .field("released", &self.is_released())
            .finish()
    }
}

/// A live change feed: an event stream plus the guard that keeps it open.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    guard: SubscriptionGuard,
}

impl Subscription {
    pub fn new(
        topic: impl Into<String>,
        events: mpsc::Receiver<ChangeEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            guard: SubscriptionGuard::new(topic, release),
        }
    }

    /// Splits the handle so the stream and the guard can live in different owners.
    pub fn into_parts(self) -> (mpsc::Receiver<ChangeEvent>, SubscriptionGuard) {
        (self.events, self.guard)
    }
}
