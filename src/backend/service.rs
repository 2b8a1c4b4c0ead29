use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::subscription::Subscription;
use super::types::{
    AuthSession, ChangeFilter, Message, Profile, SignUpProfile, Table, UserId,
};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Client misconfigured (bad URL, missing key). Not retryable.
    Config(String),
    /// Network-level failure (timeout, DNS, connection refused). Retryable.
    Network(String),
    /// The service answered with an error status.
    Api { status: u16, message: String },
    /// An operation needed a signed-in session and there was none.
    Unauthorized,
    /// Failed to parse the service's response. Not retryable.
    Parse(String),
    /// The change feed channel was closed underneath a subscription.
    ChannelClosed,
}

impl BackendError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Network(_) => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Config(msg) => write!(f, "config error: {msg}"),
            BackendError::Network(msg) => write!(f, "network error: {msg}"),
            BackendError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            BackendError::Unauthorized => write!(f, "not signed in"),
            BackendError::Parse(msg) => write!(f, "parse error: {msg}"),
            BackendError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Outcome of a sign-up request.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpResponse {
    /// The account is active and a session was issued.
    Session(AuthSession),
    /// The account exists but must be confirmed (e-mail link) before sign-in.
    ConfirmationRequired,
}

/// Everything the chat client needs from the hosted service.
///
/// Auth calls install the resulting access token on the backend, so later
/// table operations and subscriptions run as the signed-in user.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Installs (or clears) the access token used for table requests.
    fn set_access_token(&self, token: Option<String>);

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> Result<SignUpResponse, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    /// Exchanges a refresh token for a fresh session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Most recent `limit` messages, in ascending creation order.
    async fn recent_messages(&self, limit: usize) -> Result<Vec<Message>, BackendError>;

    /// Profiles for the given ids. Unknown ids are simply absent from the result.
    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>, BackendError>;

    /// A single profile, or `None` if no row matches.
    async fn profile(&self, id: &str) -> Result<Option<Profile>, BackendError>;

    /// Profiles flagged online, ordered by username.
    async fn online_profiles(&self) -> Result<Vec<Profile>, BackendError>;

    async fn insert_message(&self, user_id: &str, content: &str) -> Result<(), BackendError>;

    /// Writes the online flag (and `last_seen`, when given) of one profile.
    async fn update_presence(
        &self,
        user_id: &str,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<(), BackendError>;

    /// Opens a live change feed for `table`, filtered by event kind.
    async fn subscribe(&self, table: Table, filter: ChangeFilter)
    -> Result<Subscription, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Network("reset".into()).is_retryable());
        assert!(
            BackendError::Api {
                status: 503,
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(
            BackendError::Api {
                status: 429,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            !BackendError::Api {
                status: 400,
                message: "bad".into()
            }
            .is_retryable()
        );
        assert!(!BackendError::Parse("eof".into()).is_retryable());
    }

    #[test]
    fn test_display_includes_status() {
        let err = BackendError::Api {
            status: 401,
            message: "Invalid login credentials".into(),
        };
        assert_eq!(
            err.to_string(),
            "API error (HTTP 401): Invalid login credentials"
        );
    }
}
