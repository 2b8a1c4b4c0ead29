//! # Application State
//!
//! Core business state for Natter. This module contains domain logic only -
//! no TUI-specific types. Presentation state lives in the `tui` module.
//!
//! ```text
//! App
//! ├── user: Option<User>            // signed-in identity
//! ├── auth: AuthState               // form submission status
//! ├── mount: Option<MountId>        // current chat view, if any
//! ├── feed: Feed                    // room messages + send flag
//! ├── profiles: ProfileCache        // author profiles
//! ├── presence: Presence            // online sidebar
//! ├── presence_failed: bool         // last presence fetch failed
//! ├── disconnected: Vec<Table>      // change feeds that closed
//! ├── status_message: String        // status bar text
//! ├── show_sidebar: bool
//! ├── theme: Theme
//! ├── locale: Locale
//! └── history_limit: usize
//! ```
//!
//! State changes only happen through `update(state, action)` in action.rs.
//! This keeps things predictable, so no surprise mutations.

use chrono::Duration;

use crate::backend::{Table, User};
use crate::core::config::{MAX_PRESENCE_LEASE_SECS, ResolvedConfig, Theme};
use crate::core::feed::{DEFAULT_HISTORY_LIMIT, Feed};
use crate::core::presence::{DEFAULT_PRESENCE_LEASE_SECS, Presence};
use crate::core::profiles::ProfileCache;
use crate::core::time_format::Locale;

/// Identifies one mount of the chat view. Work issued for a mount that is no
/// longer current is dropped when it reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(u64);

impl MountId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Status of the sign-in / sign-up form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub pending: bool,
    pub error: Option<String>,
    /// Informational message, e.g. "check your inbox".
    pub notice: Option<String>,
}

pub struct App {
    pub user: Option<User>,
    pub auth: AuthState,
    pub mount: Option<MountId>,
    next_mount: u64,
    pub feed: Feed,
    pub profiles: ProfileCache,
    pub presence: Presence,
    /// The online list is stale until the next successful fetch.
    pub presence_failed: bool,
    /// Change feeds of the current mount that closed and await Ctrl+L.
    pub disconnected: Vec<Table>,
    pub status_message: String,
    pub show_sidebar: bool,
    pub theme: Theme,
    pub locale: Locale,
    pub history_limit: usize,
    presence_lease: Duration,
}

fn lease_duration(secs: u64) -> Duration {
    let secs = i64::try_from(secs.min(MAX_PRESENCE_LEASE_SECS)).unwrap_or(i64::MAX);
    Duration::seconds(secs)
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        let presence_lease = lease_duration(DEFAULT_PRESENCE_LEASE_SECS);
        Self {
            user: None,
            auth: AuthState::default(),
            mount: None,
            next_mount: 0,
            feed: Feed::new(),
            profiles: ProfileCache::new(),
            presence: Presence::new(presence_lease),
            presence_failed: false,
            disconnected: Vec::new(),
            status_message: String::new(),
            show_sidebar: true,
            theme: Theme::default(),
            locale: Locale::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            presence_lease,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        let presence_lease = lease_duration(config.presence_lease_secs);
        Self {
            theme: config.theme,
            locale: config.locale,
            history_limit: config.history_limit,
            presence: Presence::new(presence_lease),
            presence_lease,
            ..Self::new()
        }
    }

    pub fn is_current(&self, mount: MountId) -> bool {
        self.mount == Some(mount)
    }

    /// Starts a fresh chat mount, dropping everything the previous one held.
    pub(crate) fn mount_chat(&mut self) -> MountId {
        self.next_mount += 1;
        let mount = MountId(self.next_mount);
        self.mount = Some(mount);
        self.feed = Feed::new();
        self.feed.begin_load();
        self.presence = Presence::new(self.presence_lease);
        self.presence_failed = false;
        self.disconnected.clear();
        mount
    }

    /// Forgets the current mount. Returns whether one was active.
    pub(crate) fn unmount_chat(&mut self) -> bool {
        let was_mounted = self.mount.take().is_some();
        self.feed = Feed::new();
        self.presence.clear();
        self.presence_failed = false;
        self.disconnected.clear();
        was_mounted
    }

    /// The signed-in user's id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}
