//! # Presence
//!
//! Who is online. The set is replaced wholesale every time the `profiles`
//! table changes; there is no incremental patching.
//!
//! The online flag is a soft lease: an entry whose `last_seen` is older than
//! the lease is hidden even if the flag was never cleared.

use chrono::{DateTime, Duration, Utc};

use crate::backend::Profile;

pub const DEFAULT_PRESENCE_LEASE_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Presence {
    online: Vec<Profile>,
    lease: Duration,
}

impl Presence {
    pub fn new(lease: Duration) -> Self {
        Self {
            online: Vec::new(),
            lease,
        }
    }

    /// Replaces the set with freshly fetched rows, sorted by username.
    pub fn replace(&mut self, mut profiles: Vec<Profile>) {
        profiles.retain(|p| p.is_online);
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        self.online = profiles;
    }

    pub fn clear(&mut self) {
        self.online.clear();
    }

    /// Profiles whose lease is still valid at `now`.
    pub fn present(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Profile> {
        let lease = self.lease;
        self.online.iter().filter(move |p| p.is_present(now, lease))
    }

    pub fn count(&self, now: DateTime<Utc>) -> usize {
        self.present(now).count()
    }
}
