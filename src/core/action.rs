//! # Actions
//!
//! Everything that can happen in Natter becomes an `Action`.
//! User presses Enter? That's `Action::SendMessage(text)`.
//! A row lands on the change feed? That's `Action::MessageInserted { .. }`.
//!
//! The `update()` function takes the current state and an action, mutates the
//! state, and returns the [`Effect`] the adapter should carry out. No I/O
//! happens here.
//!
//! ```text
//! State + Action  →  update()  →  New State + Effect
//! ```
//!
//! Feed and presence actions carry the [`MountId`] they were issued for. Once
//! the chat view is unmounted, late results are dropped instead of written.
//!
//! Failed fetches and closed change feeds land on the status line. Ctrl+L
//! (`RetryLoad`) retries whatever is outstanding: the history load, authors
//! still unresolved, the online list, and closed feeds.

use std::fmt;

use log::debug;

use crate::backend::{Message, Profile, Table, User, UserId};
use crate::core::feed::{FeedSnapshot, LoadState};
use crate::core::profiles::ProfileCache;
use crate::core::state::{App, AuthState, MountId};

/// Credentials submitted from the auth form.
#[derive(Clone, PartialEq)]
pub enum AuthRequest {
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        username: String,
    },
}

// Actions are logged; keep passwords out of the log.
impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRequest::SignIn { email, .. } => f
                .debug_struct("SignIn")
                .field("email", email)
                .finish_non_exhaustive(),
            AuthRequest::SignUp {
                email, username, ..
            } => f
                .debug_struct("SignUp")
                .field("email", email)
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Auth
    SubmitAuth(AuthRequest),
    AuthFailed(String),
    ConfirmationRequired,
    SessionChanged(Option<User>),
    SignOut,

    // Feed
    FeedLoaded {
        mount: MountId,
        snapshot: FeedSnapshot,
    },
    FeedFailed {
        mount: MountId,
        error: String,
    },
    RetryLoad,
    MessageInserted {
        mount: MountId,
        message: Message,
    },
    ProfileResolved {
        mount: MountId,
        profile: Profile,
    },
    ProfileFailed {
        mount: MountId,
        user_id: UserId,
        error: String,
    },
    SendMessage(String),
    MessageSent {
        mount: MountId,
    },
    SendFailed {
        mount: MountId,
        error: String,
    },

    // Presence
    PresenceChanged {
        mount: MountId,
    },
    PresenceLoaded {
        mount: MountId,
        profiles: Vec<Profile>,
    },
    PresenceFailed {
        mount: MountId,
        error: String,
    },

    // Change feeds
    FeedDisconnected {
        mount: MountId,
        table: Table,
    },
    FeedReconnected {
        mount: MountId,
        table: Table,
    },

    // UI
    ToggleSidebar,
    ToggleTheme,
    Quit,
}

/// Side effects requested by [`update`], carried out by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Quit,
    Authenticate(AuthRequest),
    SignOut,
    /// Open both subscriptions, load the feed, fetch presence.
    MountChat(MountId),
    /// Release the subscriptions and abort the mount's tasks.
    UnmountChat,
    /// Reload the history, resolving only authors missing from `known`.
    LoadFeed {
        mount: MountId,
        known: ProfileCache,
    },
    FetchProfile {
        mount: MountId,
        user_id: UserId,
    },
    FetchPresence(MountId),
    /// Reopen a change feed that closed.
    Resubscribe {
        mount: MountId,
        table: Table,
    },
    InsertMessage {
        mount: MountId,
        user_id: UserId,
        content: String,
    },
    ClearInput,
    Batch(Vec<Effect>),
}

impl Effect {
    /// Collapses a list of effects: nothing, a single effect, or a batch.
    pub fn batch(mut effects: Vec<Effect>) -> Effect {
        match effects.len() {
            0 => Effect::None,
            1 => effects.remove(0),
            _ => Effect::Batch(effects),
        }
    }
}

const RETRY_HINT: &str = "(Ctrl+L to retry)";

pub fn update(app: &mut App, action: Action) -> Effect {
    match action {
        Action::SubmitAuth(request) => {
            if app.auth.pending {
                return Effect::None;
            }
            app.auth = AuthState {
                pending: true,
                ..AuthState::default()
            };
            Effect::Authenticate(request)
        }
        Action::AuthFailed(error) => {
            app.auth.pending = false;
            app.auth.error = Some(error);
            Effect::None
        }
        Action::ConfirmationRequired => {
            app.auth.pending = false;
            app.auth.notice =
                Some("Account created. Confirm your e-mail, then sign in.".to_string());
            Effect::None
        }
        Action::SessionChanged(Some(user)) => {
            app.auth = AuthState::default();
            if app.user.as_ref() == Some(&user) && app.mount.is_some() {
                return Effect::None;
            }
            app.status_message = format!(
                "Signed in as {}",
                user.email.as_deref().unwrap_or(&user.id)
            );
            app.user = Some(user);
            Effect::MountChat(app.mount_chat())
        }
        Action::SessionChanged(None) => {
            app.user = None;
            app.auth.pending = false;
            app.status_message.clear();
            if app.unmount_chat() {
                Effect::UnmountChat
            } else {
                Effect::None
            }
        }
        Action::SignOut => {
            if app.user.is_none() {
                return Effect::None;
            }
            app.status_message = "Signing out...".to_string();
            Effect::SignOut
        }

        Action::FeedLoaded { mount, snapshot } => {
            if !app.is_current(mount) {
                debug!("Dropping feed load for stale mount {:?}", mount);
                return Effect::None;
            }
            app.profiles.extend(snapshot.profiles);
            app.feed.apply_snapshot(snapshot.messages);
            Effect::None
        }
        Action::FeedFailed { mount, error } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            app.status_message = format!("Couldn't load messages {RETRY_HINT}");
            app.feed.fail_load(error);
            Effect::None
        }
        Action::RetryLoad => retry(app),
        Action::MessageInserted { mount, message } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            let author = message.user_id.clone();
            app.feed.push(message);
            if app.profiles.contains(&author) {
                Effect::None
            } else {
                Effect::FetchProfile {
                    mount,
                    user_id: author,
                }
            }
        }
        Action::ProfileResolved { mount, profile } => {
            if !app.is_current(mount) {
                debug!("Dropping profile {} for stale mount {:?}", profile.id, mount);
                return Effect::None;
            }
            app.profiles.insert(profile);
            Effect::None
        }
        Action::ProfileFailed {
            mount,
            user_id,
            error,
        } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            debug!("Author {} unresolved: {}", user_id, error);
            app.status_message = format!("Couldn't load profile for {user_id} {RETRY_HINT}");
            Effect::None
        }
        Action::SendMessage(text) => {
            let (Some(mount), Some(user_id)) = (app.mount, app.user_id()) else {
                return Effect::None;
            };
            let user_id = user_id.to_string();
            match app.feed.begin_send(&text) {
                Some(content) => Effect::InsertMessage {
                    mount,
                    user_id,
                    content,
                },
                None => Effect::None,
            }
        }
        Action::MessageSent { mount } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            app.feed.finish_send();
            app.status_message.clear();
            Effect::ClearInput
        }
        Action::SendFailed { mount, error } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            app.feed.finish_send();
            app.status_message = format!("Message not sent: {error}");
            Effect::None
        }

        Action::PresenceChanged { mount } => {
            if app.is_current(mount) {
                Effect::FetchPresence(mount)
            } else {
                Effect::None
            }
        }
        Action::PresenceLoaded { mount, profiles } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            app.profiles.extend(profiles.iter().cloned());
            app.presence.replace(profiles);
            app.presence_failed = false;
            Effect::None
        }
        Action::PresenceFailed { mount, error } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            debug!("Online list stale: {}", error);
            app.presence_failed = true;
            app.status_message = format!("Couldn't load online users {RETRY_HINT}");
            Effect::None
        }

        Action::FeedDisconnected { mount, table } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            if !app.disconnected.contains(&table) {
                app.disconnected.push(table);
            }
            app.status_message = "Live updates stopped (Ctrl+L to reconnect)".to_string();
            Effect::None
        }
        Action::FeedReconnected { mount, table } => {
            if !app.is_current(mount) {
                return Effect::None;
            }
            app.disconnected.retain(|t| *t != table);
            if app.disconnected.is_empty() {
                app.status_message = "Live updates restored".to_string();
            }
            // Whatever changed while the feed was down is fetched again.
            match table {
                Table::Messages => {
                    app.feed.begin_load();
                    Effect::LoadFeed {
                        mount,
                        known: app.profiles.clone(),
                    }
                }
                Table::Profiles => Effect::FetchPresence(mount),
            }
        }

        Action::ToggleSidebar => {
            app.show_sidebar = !app.show_sidebar;
            Effect::None
        }
        Action::ToggleTheme => {
            app.theme = app.theme.toggled();
            Effect::None
        }
        Action::Quit => Effect::Quit,
    }
}

/// Everything Ctrl+L can retry on the current mount.
fn retry(app: &mut App) -> Effect {
    let Some(mount) = app.mount else {
        return Effect::None;
    };
    let mut effects = Vec::new();

    if matches!(app.feed.load_state, LoadState::Failed(_)) {
        app.feed.begin_load();
        effects.push(Effect::LoadFeed {
            mount,
            known: app.profiles.clone(),
        });
    }
    let unresolved = app
        .profiles
        .missing(app.feed.messages().iter().map(|m| m.user_id.as_str()));
    effects.extend(
        unresolved
            .into_iter()
            .map(|user_id| Effect::FetchProfile { mount, user_id }),
    );
    if app.presence_failed {
        effects.push(Effect::FetchPresence(mount));
    }
    // A feed counts as disconnected again only if reopening it fails.
    effects.extend(
        app.disconnected
            .drain(..)
            .map(|table| Effect::Resubscribe { mount, table }),
    );

    if !effects.is_empty() {
        app.status_message = "Retrying...".to_string();
    }
    Effect::batch(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{message, profile, t0};

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: Some(format!("{id}@example.com")),
        }
    }

    /// Signed in as `u1` with a loaded, empty feed.
    fn mounted_app() -> (App, MountId) {
        let mut app = App::new();
        let Effect::MountChat(mount) = update(&mut app, Action::SessionChanged(Some(user("u1"))))
        else {
            panic!("expected a mount");
        };
        update(
            &mut app,
            Action::FeedLoaded {
                mount,
                snapshot: FeedSnapshot::default(),
            },
        );
        (app, mount)
    }

    fn visible_ids(app: &App) -> Vec<String> {
        app.feed
            .visible(&app.profiles)
            .map(|(m, _)| m.id.clone())
            .collect()
    }

    #[test]
    fn test_insert_from_cached_author_fetches_nothing() {
        let (mut app, mount) = mounted_app();
        app.profiles.insert(profile("u2", "grace"));

        let effect = update(
            &mut app,
            Action::MessageInserted {
                mount,
                message: message("m1", "u2", "hi", 0),
            },
        );

        assert_eq!(effect, Effect::None);
        assert_eq!(visible_ids(&app), vec!["m1"]);
    }

    #[test]
    fn test_insert_from_unknown_author_fetches_once() {
        let (mut app, mount) = mounted_app();

        let effect = update(
            &mut app,
            Action::MessageInserted {
                mount,
                message: message("m1", "u2", "hi", 0),
            },
        );

        assert_eq!(
            effect,
            Effect::FetchProfile {
                mount,
                user_id: "u2".to_string()
            }
        );
        assert!(visible_ids(&app).is_empty());
    }

    #[test]
    fn test_unresolved_author_messages_appear_together_in_order() {
        let (mut app, mount) = mounted_app();
        app.profiles.insert(profile("u1", "ada"));

        for (id, author) in [("m0", "u1"), ("m1", "u2"), ("m2", "u2"), ("m3", "u1")] {
            update(
                &mut app,
                Action::MessageInserted {
                    mount,
                    message: message(id, author, "text", 0),
                },
            );
        }
        assert_eq!(visible_ids(&app), vec!["m0", "m3"]);

        update(
            &mut app,
            Action::ProfileResolved {
                mount,
                profile: profile("u2", "grace"),
            },
        );
        assert_eq!(visible_ids(&app), vec!["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn test_duplicate_insert_is_kept_twice() {
        let (mut app, mount) = mounted_app();
        app.profiles.insert(profile("u2", "grace"));
        let dup = message("m1", "u2", "hi", 0);

        update(&mut app, Action::MessageInserted { mount, message: dup.clone() });
        update(&mut app, Action::MessageInserted { mount, message: dup });

        assert_eq!(visible_ids(&app), vec!["m1", "m1"]);
    }

    #[test]
    fn test_late_profile_after_unmount_is_ignored() {
        let (mut app, mount) = mounted_app();
        update(
            &mut app,
            Action::MessageInserted {
                mount,
                message: message("m1", "u2", "hi", 0),
            },
        );

        assert_eq!(update(&mut app, Action::SessionChanged(None)), Effect::UnmountChat);
        let effect = update(
            &mut app,
            Action::ProfileResolved {
                mount,
                profile: profile("u2", "grace"),
            },
        );

        assert_eq!(effect, Effect::None);
        assert!(!app.profiles.contains("u2"));
        assert!(app.feed.is_empty());
    }

    #[test]
    fn test_stale_feed_load_after_remount_is_ignored() {
        let (mut app, old_mount) = mounted_app();
        update(&mut app, Action::SessionChanged(None));
        let Effect::MountChat(new_mount) =
            update(&mut app, Action::SessionChanged(Some(user("u1"))))
        else {
            panic!("expected a mount");
        };
        assert_ne!(old_mount, new_mount);

        update(
            &mut app,
            Action::FeedLoaded {
                mount: old_mount,
                snapshot: FeedSnapshot {
                    messages: vec![message("m1", "u1", "old", 0)],
                    profiles: vec![profile("u1", "ada")],
                },
            },
        );

        assert!(app.feed.is_empty());
        assert!(app.feed.is_loading());
    }

    #[test]
    fn test_blank_send_is_noop() {
        let (mut app, _) = mounted_app();

        assert_eq!(update(&mut app, Action::SendMessage("   ".to_string())), Effect::None);
        assert!(!app.feed.sending);
    }

    #[test]
    fn test_send_flow_clears_input_on_success() {
        let (mut app, mount) = mounted_app();

        let effect = update(&mut app, Action::SendMessage("  hello ".to_string()));
        assert_eq!(
            effect,
            Effect::InsertMessage {
                mount,
                user_id: "u1".to_string(),
                content: "hello".to_string()
            }
        );
        assert_eq!(update(&mut app, Action::SendMessage("again".to_string())), Effect::None);

        assert_eq!(update(&mut app, Action::MessageSent { mount }), Effect::ClearInput);
        assert!(!app.feed.sending);
    }

    #[test]
    fn test_send_failure_keeps_input_and_reports() {
        let (mut app, mount) = mounted_app();
        update(&mut app, Action::SendMessage("hello".to_string()));

        let effect = update(
            &mut app,
            Action::SendFailed {
                mount,
                error: "network error: reset".to_string(),
            },
        );

        assert_eq!(effect, Effect::None);
        assert!(!app.feed.sending);
        assert!(app.status_message.contains("not sent"));
    }

    #[test]
    fn test_send_while_signed_out_is_noop() {
        let mut app = App::new();
        assert_eq!(update(&mut app, Action::SendMessage("hi".to_string())), Effect::None);
    }

    #[test]
    fn test_retry_only_after_failure() {
        let (mut app, mount) = mounted_app();
        assert_eq!(update(&mut app, Action::RetryLoad), Effect::None);

        update(
            &mut app,
            Action::FeedFailed {
                mount,
                error: "timeout".to_string(),
            },
        );
        assert_eq!(app.feed.load_state, LoadState::Failed("timeout".to_string()));

        assert_eq!(
            update(&mut app, Action::RetryLoad),
            Effect::LoadFeed {
                mount,
                known: ProfileCache::new(),
            }
        );
        assert!(app.feed.is_loading());
        assert_eq!(app.status_message, "Retrying...");
    }

    #[test]
    fn test_failed_profile_is_reported_and_retried() {
        let (mut app, mount) = mounted_app();
        app.profiles.insert(profile("u1", "ada"));
        update(
            &mut app,
            Action::MessageInserted {
                mount,
                message: message("m1", "u2", "hi", 0),
            },
        );
        update(
            &mut app,
            Action::MessageInserted {
                mount,
                message: message("m2", "u1", "hello", 1),
            },
        );

        update(
            &mut app,
            Action::ProfileFailed {
                mount,
                user_id: "u2".to_string(),
                error: "connection refused".to_string(),
            },
        );
        assert_eq!(app.status_message, "Couldn't load profile for u2 (Ctrl+L to retry)");
        assert_eq!(visible_ids(&app), vec!["m2"]);

        assert_eq!(
            update(&mut app, Action::RetryLoad),
            Effect::FetchProfile {
                mount,
                user_id: "u2".to_string(),
            }
        );
        update(
            &mut app,
            Action::ProfileResolved {
                mount,
                profile: profile("u2", "grace"),
            },
        );
        assert_eq!(visible_ids(&app), vec!["m1", "m2"]);
        assert_eq!(update(&mut app, Action::RetryLoad), Effect::None);
    }

    #[test]
    fn test_failed_presence_is_reported_and_retried() {
        let (mut app, mount) = mounted_app();
        update(
            &mut app,
            Action::PresenceFailed {
                mount,
                error: "timed out".to_string(),
            },
        );
        assert!(app.presence_failed);
        assert_eq!(app.status_message, "Couldn't load online users (Ctrl+L to retry)");

        assert_eq!(update(&mut app, Action::RetryLoad), Effect::FetchPresence(mount));
        update(
            &mut app,
            Action::PresenceLoaded {
                mount,
                profiles: vec![profile("u2", "bob")],
            },
        );
        assert!(!app.presence_failed);
        assert_eq!(update(&mut app, Action::RetryLoad), Effect::None);
    }

    #[test]
    fn test_closed_feeds_are_reported_and_reopened() {
        let (mut app, mount) = mounted_app();
        app.profiles.insert(profile("u1", "ada"));
        for table in [Table::Messages, Table::Profiles, Table::Messages] {
            update(&mut app, Action::FeedDisconnected { mount, table });
        }
        assert_eq!(app.disconnected, vec![Table::Messages, Table::Profiles]);
        assert_eq!(app.status_message, "Live updates stopped (Ctrl+L to reconnect)");

        assert_eq!(
            update(&mut app, Action::RetryLoad),
            Effect::Batch(vec![
                Effect::Resubscribe {
                    mount,
                    table: Table::Messages,
                },
                Effect::Resubscribe {
                    mount,
                    table: Table::Profiles,
                },
            ])
        );
        // A second press while reconnecting has nothing left to do.
        assert!(app.disconnected.is_empty());
        assert_eq!(update(&mut app, Action::RetryLoad), Effect::None);

        let Effect::LoadFeed { mount: m, known } = update(
            &mut app,
            Action::FeedReconnected {
                mount,
                table: Table::Messages,
            },
        ) else {
            panic!("expected a reload");
        };
        assert_eq!(m, mount);
        assert!(known.contains("u1"));
        assert!(app.feed.is_loading());
        assert_eq!(
            update(
                &mut app,
                Action::FeedReconnected {
                    mount,
                    table: Table::Profiles,
                },
            ),
            Effect::FetchPresence(mount)
        );
        assert_eq!(app.status_message, "Live updates restored");
    }

    #[test]
    fn test_failures_for_stale_mount_are_ignored() {
        let (mut app, old) = mounted_app();
        update(&mut app, Action::SessionChanged(None));
        update(&mut app, Action::SessionChanged(Some(user("u1"))));
        app.status_message.clear();

        update(
            &mut app,
            Action::FeedDisconnected {
                mount: old,
                table: Table::Messages,
            },
        );
        update(
            &mut app,
            Action::PresenceFailed {
                mount: old,
                error: "gone".to_string(),
            },
        );
        update(
            &mut app,
            Action::ProfileFailed {
                mount: old,
                user_id: "u2".to_string(),
                error: "gone".to_string(),
            },
        );

        assert!(app.disconnected.is_empty());
        assert!(!app.presence_failed);
        assert!(app.status_message.is_empty());
    }

    #[test]
    fn test_same_user_does_not_remount() {
        let (mut app, mount) = mounted_app();
        assert_eq!(update(&mut app, Action::SessionChanged(Some(user("u1")))), Effect::None);
        assert!(app.is_current(mount));
    }

    #[test]
    fn test_presence_reload_is_mount_scoped() {
        let (mut app, mount) = mounted_app();
        assert_eq!(
            update(&mut app, Action::PresenceChanged { mount }),
            Effect::FetchPresence(mount)
        );

        update(
            &mut app,
            Action::PresenceLoaded {
                mount,
                profiles: vec![profile("u3", "zoe"), profile("u2", "ada")],
            },
        );
        let names: Vec<&str> = app.presence.present(t0()).map(|p| p.username.as_str()).collect();
        assert_eq!(names, vec!["ada", "zoe"]);

        update(&mut app, Action::SessionChanged(None));
        assert_eq!(update(&mut app, Action::PresenceChanged { mount }), Effect::None);
    }

    #[test]
    fn test_auth_submission_lifecycle() {
        let mut app = App::new();
        let request = AuthRequest::SignIn {
            email: "a@b.c".to_string(),
            password: "pw".to_string(),
        };

        assert_eq!(
            update(&mut app, Action::SubmitAuth(request.clone())),
            Effect::Authenticate(request.clone())
        );
        assert!(app.auth.pending);
        assert_eq!(update(&mut app, Action::SubmitAuth(request)), Effect::None);

        update(&mut app, Action::AuthFailed("Invalid login credentials".to_string()));
        assert!(!app.auth.pending);
        assert_eq!(app.auth.error.as_deref(), Some("Invalid login credentials"));
    }

    #[test]
    fn test_auth_request_debug_hides_password() {
        let request = AuthRequest::SignUp {
            email: "a@b.c".to_string(),
            password: "hunter2".to_string(),
            username: "ada".to_string(),
        };
        let shown = format!("{request:?}");
        assert!(shown.contains("ada"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_toggles_and_quit() {
        let mut app = App::new();
        update(&mut app, Action::ToggleSidebar);
        assert!(!app.show_sidebar);
        let theme = app.theme;
        update(&mut app, Action::ToggleTheme);
        assert_ne!(app.theme, theme);
        assert_eq!(update(&mut app, Action::Quit), Effect::Quit);
    }
}
