//! # Session Store
//!
//! Who is signed in, and the heartbeat that keeps their profile marked online.
//!
//! ```text
//! SessionStore
//! ├── backend: Arc<dyn Backend>          // auth + presence writes
//! ├── inner: Arc<Mutex<Inner>>           // session + heartbeat + refresh tasks
//! └── user_tx: Arc<watch::Sender<Option<User>>>
//! ```
//!
//! The heartbeat writes `is_online = true, last_seen = now` straight to the
//! backend, once immediately and then every interval. It never touches local
//! state. Sign-out and teardown stop it and mark the profile offline, best
//! effort and bounded by [`OFFLINE_WRITE_TIMEOUT`].
//!
//! Access tokens are refreshed [`REFRESH_MARGIN_SECS`] before they expire. A
//! refresh the service rejects ends the session.
//!
//! The session (tokens only) is kept in `~/.natter/session.json` so the next
//! run can restore it. All writes use atomic rename (write `.tmp`, then
//! `rename()`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::{AuthSession, Backend, BackendError, SignUpProfile, SignUpResponse, User};

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Refresh the access token this long before it expires.
pub const REFRESH_MARGIN_SECS: i64 = 60;
/// Wait before retrying a refresh that failed in transit.
const REFRESH_RETRY: Duration = Duration::from_secs(15);
/// The offline write at sign-out or exit is given up after this long.
pub const OFFLINE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Avatar colours handed out at sign-up.
pub const AVATAR_PALETTE: [&str; 6] = [
    "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899",
];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Form input rejected before any request was made.
    Validation(String),
    /// The auth service refused the request (bad credentials, taken email).
    Rejected(String),
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Api { status, message } if (400..500).contains(&status) && status != 429 => {
                AuthError::Rejected(message)
            }
            other => AuthError::Backend(other),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Validation(msg) => write!(f, "{msg}"),
            AuthError::Rejected(msg) => write!(f, "{msg}"),
            AuthError::Backend(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    SignedIn(User),
    /// The account exists but its e-mail must be confirmed before signing in.
    ConfirmationRequired,
}

// ============================================================================
// Store
// ============================================================================

/// Aborts a background task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Default)]
struct Inner {
    session: Option<AuthSession>,
    heartbeat: Option<TaskGuard>,
    refresh: Option<TaskGuard>,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SessionStore {
    backend: Arc<dyn Backend>,
    interval: Duration,
    persist_path: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
    user_tx: Arc<watch::Sender<Option<User>>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        let (user_tx, _) = watch::channel(None);
        Self {
            backend,
            interval,
            persist_path: None,
            inner: Arc::new(Mutex::new(Inner::default())),
            user_tx: Arc::new(user_tx),
        }
    }

    /// Persists the session to `path` after every sign-in.
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.persist_path = Some(path);
        self
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Session changes, starting with the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.lock().session.as_ref().map(|s| s.user.clone())
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.lock().heartbeat.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let (email, password) = validate_credentials(email, password)?;
        info!("Signing in as {}", email);
        let session = self.backend.sign_in(email, password).await?;
        Ok(self.activate(session))
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }
        let (email, password) = validate_credentials(email, password)?;
        let profile = SignUpProfile {
            username: username.to_string(),
            avatar_color: pick_avatar_color(&mut rand::rng()).to_string(),
        };
        info!("Signing up {} as {} ({})", email, profile.username, profile.avatar_color);

        match self.backend.sign_up(email, password, &profile).await? {
            SignUpResponse::Session(session) => Ok(SignUpOutcome::SignedIn(self.activate(session))),
            SignUpResponse::ConfirmationRequired => {
                info!("Sign-up for {} awaits e-mail confirmation", email);
                Ok(SignUpOutcome::ConfirmationRequired)
            }
        }
    }

    /// Resumes a persisted session through a token refresh.
    ///
    /// A stale or unreadable session file is discarded and the user stays
    /// signed out; only transport failures are reported.
    pub async fn restore(&self) -> Result<Option<User>, AuthError> {
        let Some(path) = self.persist_path.as_deref() else {
            return Ok(None);
        };
        let stored = match load_session(path) {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Discarding unreadable session file {}: {}", path.display(), e);
                discard_session(path);
                return Ok(None);
            }
        };

        match self.backend.refresh_session(&stored.refresh_token).await {
            Ok(session) => {
                info!("Restored session for {}", session.user.id);
                Ok(Some(self.activate(session)))
            }
            Err(e) if e.is_retryable() => Err(AuthError::Backend(e)),
            Err(e) => {
                warn!("Stored session rejected ({}), signing out", e);
                discard_session(path);
                Ok(None)
            }
        }
    }

    /// Stops the heartbeat, marks the profile offline, and ends the session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = {
            let mut inner = self.lock();
            inner.heartbeat = None;
            inner.refresh = None;
            inner.session.take()
        };
        let Some(session) = session else {
            return Ok(());
        };
        info!("Signing out {}", session.user.id);

        self.mark_offline(&session.user.id).await;
        if let Err(e) = self.backend.sign_out().await {
            warn!("Auth sign-out failed: {}", e);
        }
        self.backend.set_access_token(None);
        if let Some(path) = self.persist_path.as_deref() {
            discard_session(path);
        }
        self.user_tx.send_replace(None);
        Ok(())
    }

    /// Process-exit cleanup: stop the heartbeat and mark the profile offline.
    /// The session itself is kept so the next run can restore it.
    pub async fn teardown(&self) {
        let (heartbeat, user_id) = {
            let mut inner = self.lock();
            inner.refresh = None;
            let user_id = inner.session.as_ref().map(|s| s.user.id.clone());
            (inner.heartbeat.take(), user_id)
        };
        let (Some(heartbeat), Some(user_id)) = (heartbeat, user_id) else {
            debug!("Teardown: nothing running");
            return;
        };
        drop(heartbeat);
        self.mark_offline(&user_id).await;
    }

    async fn mark_offline(&self, user_id: &str) {
        let write = self.backend.update_presence(user_id, false, None);
        match tokio::time::timeout(OFFLINE_WRITE_TIMEOUT, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to mark {} offline: {}", user_id, e),
            Err(_) => warn!(
                "Marking {} offline timed out after {:?}",
                user_id, OFFLINE_WRITE_TIMEOUT
            ),
        }
    }

    /// Installs a new session: persist it, restart the heartbeat, publish.
    fn activate(&self, session: AuthSession) -> User {
        let user = session.user.clone();
        self.backend.set_access_token(Some(session.access_token.clone()));

        if let Some(path) = self.persist_path.as_deref() {
            if let Err(e) = save_session(path, &session) {
                warn!("Failed to persist session: {}", e);
            }
        }

        let heartbeat = spawn_heartbeat(self.backend.clone(), user.id.clone(), self.interval);
        let refresh = session.expires_at.map(|expires_at| {
            let refresher = Refresher {
                backend: self.backend.clone(),
                persist_path: self.persist_path.clone(),
                inner: self.inner.clone(),
                user_tx: self.user_tx.clone(),
            };
            refresher.spawn(user.id.clone(), expires_at)
        });
        {
            let mut inner = self.lock();
            inner.session = Some(session);
            inner.heartbeat = Some(heartbeat);
            inner.refresh = refresh;
        }
        self.user_tx.send_replace(Some(user.clone()));
        user
    }
}

fn validate_credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str), AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }
    Ok((email, password))
}

pub fn pick_avatar_color<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    AVATAR_PALETTE[rng.random_range(0..AVATAR_PALETTE.len())]
}

fn spawn_heartbeat(backend: Arc<dyn Backend>, user_id: String, every: Duration) -> TaskGuard {
    debug!("Starting heartbeat for {} every {:?}", user_id, every);
    TaskGuard(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = backend.update_presence(&user_id, true, Some(Utc::now())).await {
                warn!("Heartbeat for {} failed: {}", user_id, e);
            }
        }
    }))
}

/// How long to wait before refreshing a token that expires at `expires_at`
/// (Unix seconds), seen from `now`.
pub fn refresh_delay(expires_at: i64, now: i64) -> Duration {
    let secs = expires_at
        .saturating_sub(now)
        .saturating_sub(REFRESH_MARGIN_SECS);
    Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

/// Keeps the access token of one session fresh.
struct Refresher {
    backend: Arc<dyn Backend>,
    persist_path: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
    user_tx: Arc<watch::Sender<Option<User>>>,
}

impl Refresher {
    fn spawn(self, user_id: String, expires_at: i64) -> TaskGuard {
        let wait = refresh_delay(expires_at, Utc::now().timestamp());
        debug!("Refreshing token for {} in {:?}", user_id, wait);
        TaskGuard(tokio::spawn(self.run(user_id, wait)))
    }

    async fn run(self, user_id: String, mut wait: Duration) {
        loop {
            tokio::time::sleep(wait).await;
            let refresh_token = {
                let inner = lock_inner(&self.inner);
                match inner.session.as_ref() {
                    Some(s) if s.user.id == user_id => s.refresh_token.clone(),
                    _ => return,
                }
            };

            match self.backend.refresh_session(&refresh_token).await {
                Ok(session) => {
                    info!("Refreshed access token for {}", user_id);
                    let next = session.expires_at;
                    if !self.install(&user_id, session) {
                        return;
                    }
                    match next {
                        Some(at) => wait = refresh_delay(at, Utc::now().timestamp()),
                        None => return,
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!("Token refresh for {} failed, retrying: {}", user_id, e);
                    wait = REFRESH_RETRY;
                }
                Err(e) => {
                    warn!("Token refresh for {} rejected ({}), signing out", user_id, e);
                    self.expire(&user_id);
                    return;
                }
            }
        }
    }

    /// Swaps in the refreshed tokens. Returns `false` if the session changed
    /// hands meanwhile.
    fn install(&self, user_id: &str, session: AuthSession) -> bool {
        let mut inner = lock_inner(&self.inner);
        if inner.session.as_ref().map(|s| s.user.id.as_str()) != Some(user_id) {
            return false;
        }
        self.backend.set_access_token(Some(session.access_token.clone()));
        if let Some(path) = self.persist_path.as_deref() {
            if let Err(e) = save_session(path, &session) {
                warn!("Failed to persist refreshed session: {}", e);
            }
        }
        inner.session = Some(session);
        true
    }

    /// Drops a session whose refresh token is no longer accepted.
    fn expire(&self, user_id: &str) {
        let own_task = {
            let mut inner = lock_inner(&self.inner);
            if inner.session.as_ref().map(|s| s.user.id.as_str()) != Some(user_id) {
                return;
            }
            inner.session = None;
            inner.heartbeat = None;
            inner.refresh.take()
        };
        self.backend.set_access_token(None);
        if let Some(path) = self.persist_path.as_deref() {
            discard_session(path);
        }
        self.user_tx.send_replace(None);
        // This task's own guard; nothing is awaited after it.
        drop(own_task);
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Returns `~/.natter/session.json`.
pub fn session_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".natter").join("session.json"))
}

/// Atomically write `data` as JSON to `path` (via `.tmp` + rename).
fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn save_session(path: &Path, session: &AuthSession) -> io::Result<()> {
    atomic_write_json(path, session)?;
    debug!("Session saved to {}", path.display());
    Ok(())
}

pub fn load_session(path: &Path) -> io::Result<Option<AuthSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn discard_session(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove session file {}: {}", path.display(), e);
        }
    }
}
