//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use crate::backend::{
    AuthSession, Backend, BackendError, ChangeEvent, ChangeFilter, ChangeKind, Message, Profile,
    SignUpProfile, SignUpResponse, Subscription, Table, User, UserId,
};

/// Fixed reference instant for clock-dependent tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
}

/// A profile that is online and was seen at [`t0`].
pub fn profile(id: &str, username: &str) -> Profile {
    Profile {
        id: id.to_string(),
        email: Some(format!("{username}@example.com")),
        username: username.to_string(),
        avatar_color: "#3B82F6".to_string(),
        is_online: true,
        last_seen: Some(t0()),
        created_at: Some(t0() - Duration::days(30)),
    }
}

/// A message created `offset_secs` after [`t0`].
pub fn message(id: &str, user_id: &str, content: &str, offset_secs: i64) -> Message {
    Message {
        id: id.to_string(),
        user_id: user_id.to_string(),
        content: content.to_string(),
        created_at: t0() + Duration::seconds(offset_secs),
    }
}

/// Every call the fake received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SignUp { email: String, username: String, avatar_color: String },
    SignIn { email: String },
    Refresh,
    SignOut,
    RecentMessages { limit: usize },
    Profiles { ids: Vec<UserId> },
    Profile { id: UserId },
    OnlineProfiles,
    InsertMessage { user_id: UserId, content: String },
    UpdatePresence { user_id: UserId, is_online: bool },
    Subscribe { table: Table, filter: ChangeFilter },
}

#[derive(Default)]
struct FakeState {
    users: HashMap<String, (String, User)>,
    profiles: HashMap<UserId, Profile>,
    messages: Vec<Message>,
    calls: Vec<Call>,
    access_token: Option<String>,
    feeds: Vec<(Table, ChangeFilter, mpsc::Sender<ChangeEvent>)>,
    require_confirmation: bool,
    fail_inserts: bool,
    fail_messages: bool,
    fail_presence: bool,
    fail_profiles: bool,
    fail_refresh: bool,
    stall_presence: bool,
    token_ttl: Option<i64>,
    tokens_issued: usize,
    next_id: usize,
}

/// In-memory stand-in for the hosted service.
///
/// Rows live in memory, every call is recorded, and subscriptions are plain
/// channels the test can push change events into with [`FakeBackend::emit`].
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn register_user(&self, id: &str, email: &str, password: &str) {
        let user = User {
            id: id.to_string(),
            email: Some(email.to_string()),
        };
        self.lock()
            .users
            .insert(email.to_string(), (password.to_string(), user));
    }

    pub fn add_profile(&self, profile: Profile) {
        self.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn add_message(&self, message: Message) {
        self.lock().messages.push(message);
    }

    pub fn require_confirmation(&self) {
        self.lock().require_confirmation = true;
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.lock().fail_inserts = fail;
    }

    pub fn fail_messages(&self, fail: bool) {
        self.lock().fail_messages = fail;
    }

    pub fn fail_presence(&self, fail: bool) {
        self.lock().fail_presence = fail;
    }

    /// Profile reads, including the online list, fail while set.
    pub fn fail_profiles(&self, fail: bool) {
        self.lock().fail_profiles = fail;
    }

    /// Token refreshes are rejected as unauthorized while set.
    pub fn fail_refresh(&self, fail: bool) {
        self.lock().fail_refresh = fail;
    }

    /// Presence writes never complete while set.
    pub fn stall_presence(&self, stall: bool) {
        self.lock().stall_presence = stall;
    }

    /// Issued sessions expire `secs` after they are handed out.
    pub fn expire_tokens_after(&self, secs: i64) {
        self.lock().token_ttl = Some(secs);
    }

    /// Closes every open change feed on `table`, as a dropped connection would.
    pub fn close_feeds(&self, table: Table) {
        self.lock().feeds.retain(|(t, _, _)| *t != table);
    }

    pub fn refreshes(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Refresh))
            .count()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn stored_profile(&self, id: &str) -> Option<Profile> {
        self.lock().profiles.get(id).cloned()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// Number of single and bulk profile reads.
    pub fn profile_fetches(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Profile { .. } | Call::Profiles { .. }))
            .count()
    }

    /// Presence writes as `(user_id, is_online)`, in order.
    pub fn presence_writes(&self) -> Vec<(UserId, bool)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::UpdatePresence { user_id, is_online } => Some((user_id.clone(), *is_online)),
                _ => None,
            })
            .collect()
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn subscriptions_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions_opened() - self.subscriptions_released()
    }

    /// Pushes a change event to every open feed on `table` whose filter accepts it.
    pub fn emit(&self, table: Table, kind: ChangeKind, record: serde_json::Value) {
        let senders: Vec<_> = self
            .lock()
            .feeds
            .iter()
            .filter(|(t, filter, tx)| *t == table && filter.matches(kind) && !tx.is_closed())
            .map(|(_, _, tx)| tx.clone())
            .collect();
        for tx in senders {
            let _ = tx.try_send(ChangeEvent {
                table: table.as_str().to_string(),
                kind,
                record: record.clone(),
                old_record: serde_json::Value::Null,
            });
        }
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    fn session_for(state: &mut FakeState, user: &User) -> AuthSession {
        state.tokens_issued += 1;
        let session = AuthSession {
            access_token: format!("access-{}-{}", user.id, state.tokens_issued),
            refresh_token: format!("refresh-{}", user.id),
            expires_at: state.token_ttl.map(|ttl| Utc::now().timestamp() + ttl),
            user: user.clone(),
        };
        state.access_token = Some(session.access_token.clone());
        session
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn set_access_token(&self, token: Option<String>) {
        self.lock().access_token = token;
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> Result<SignUpResponse, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::SignUp {
            email: email.to_string(),
            username: profile.username.clone(),
            avatar_color: profile.avatar_color.clone(),
        });
        if state.users.contains_key(email) {
            return Err(BackendError::Api {
                status: 422,
                message: "User already registered".to_string(),
            });
        }
        let user = User {
            id: Self::next_id(&mut state, "user"),
            email: Some(email.to_string()),
        };
        state
            .users
            .insert(email.to_string(), (password.to_string(), user.clone()));
        state.profiles.insert(
            user.id.clone(),
            Profile {
                id: user.id.clone(),
                email: Some(email.to_string()),
                username: profile.username.clone(),
                avatar_color: profile.avatar_color.clone(),
                is_online: false,
                last_seen: None,
                created_at: Some(Utc::now()),
            },
        );
        if state.require_confirmation {
            return Ok(SignUpResponse::ConfirmationRequired);
        }
        Ok(SignUpResponse::Session(Self::session_for(&mut state, &user)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::SignIn {
            email: email.to_string(),
        });
        let user = match state.users.get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            _ => {
                return Err(BackendError::Api {
                    status: 400,
                    message: "Invalid login credentials".to_string(),
                });
            }
        };
        Ok(Self::session_for(&mut state, &user))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::Refresh);
        if state.fail_refresh {
            return Err(BackendError::Unauthorized);
        }
        let user = state
            .users
            .values()
            .map(|(_, user)| user)
            .find(|user| format!("refresh-{}", user.id) == refresh_token)
            .cloned()
            .ok_or(BackendError::Unauthorized)?;
        Ok(Self::session_for(&mut state, &user))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::SignOut);
        state.access_token = None;
        Ok(())
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<Message>, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::RecentMessages { limit });
        if state.fail_messages {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        let skip = state.messages.len().saturating_sub(limit);
        Ok(state.messages[skip..].to_vec())
    }

    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::Profiles { ids: ids.to_vec() });
        if state.fail_profiles {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }

    async fn profile(&self, id: &str) -> Result<Option<Profile>, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::Profile { id: id.to_string() });
        if state.fail_profiles {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        Ok(state.profiles.get(id).cloned())
    }

    async fn online_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        let mut state = self.lock();
        state.calls.push(Call::OnlineProfiles);
        if state.fail_profiles {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        let mut online: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| p.is_online)
            .cloned()
            .collect();
        online.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(online)
    }

    async fn insert_message(&self, user_id: &str, content: &str) -> Result<(), BackendError> {
        let inserted = {
            let mut state = self.lock();
            state.calls.push(Call::InsertMessage {
                user_id: user_id.to_string(),
                content: content.to_string(),
            });
            if state.fail_inserts {
                return Err(BackendError::Network("connection reset".to_string()));
            }
            let message = Message {
                id: Self::next_id(&mut state, "msg"),
                user_id: user_id.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            };
            state.messages.push(message.clone());
            message
        };
        let record = serde_json::to_value(&inserted).map_err(|e| BackendError::Parse(e.to_string()))?;
        self.emit(Table::Messages, ChangeKind::Insert, record);
        Ok(())
    }

    async fn update_presence(
        &self,
        user_id: &str,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<(), BackendError> {
        let stalled = {
            let mut state = self.lock();
            state.calls.push(Call::UpdatePresence {
                user_id: user_id.to_string(),
                is_online,
            });
            state.stall_presence
        };
        if stalled {
            futures::future::pending::<()>().await;
        }
        let mut state = self.lock();
        if state.fail_presence {
            return Err(BackendError::Network("timed out".to_string()));
        }
        if let Some(profile) = state.profiles.get_mut(user_id) {
            profile.is_online = is_online;
            if last_seen.is_some() {
                profile.last_seen = last_seen;
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: ChangeFilter,
    ) -> Result<Subscription, BackendError> {
        let (tx, rx) = mpsc::channel(64);
        let topic = {
            let mut state = self.lock();
            state.calls.push(Call::Subscribe { table, filter });
            state.feeds.push((table, filter, tx));
            let id = Self::next_id(&mut state, table.as_str());
            format!("realtime:{id}")
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        Ok(Subscription::new(topic, rx, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
