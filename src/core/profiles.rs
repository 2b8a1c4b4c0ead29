//! # Profile Cache
//!
//! Author profiles keyed by user id, filled lazily as messages reference them.
//! Nothing is ever evicted. A profile fetched twice simply overwrites itself.

use std::collections::HashMap;

use crate::backend::{Profile, UserId};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfileCache {
    profiles: HashMap<UserId, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Inserts or replaces a profile. Last write wins.
    pub fn insert(&mut self, profile: Profile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn extend(&mut self, profiles: impl IntoIterator<Item = Profile>) {
        for profile in profiles {
            self.insert(profile);
        }
    }

    /// Ids from `ids` with no cached profile, first occurrence order, no repeats.
    pub fn missing<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<UserId> {
        let mut out: Vec<UserId> = Vec::new();
        for id in ids {
            if !self.contains(id) && !out.iter().any(|seen| seen == id) {
                out.push(id.to_string());
            }
        }
        out
    }
}
