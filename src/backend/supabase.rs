//! Supabase backend: GoTrue for auth, PostgREST for tables, Realtime for the change feed.
//!
//! Every request carries the project's anon key as `apikey`. Table requests
//! are authorized with the signed-in user's access token when there is one,
//! and with the anon key otherwise (row-level security decides what that sees).

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::realtime::{self, ChannelSpec};
use super::service::{Backend, BackendError, SignUpResponse};
use super::subscription::Subscription;
use super::types::{
    AuthSession, ChangeFilter, Message, NewMessage, PresenceUpdate, Profile, SignUpProfile,
    Table, User, UserId,
};

// ============================================================================
// GoTrue Wire Types
// ============================================================================

#[derive(Serialize, Debug)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize, Debug)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a SignUpProfile,
}

#[derive(Serialize, Debug)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token grant response. Sign-up returns the same shape when no e-mail
/// confirmation is required, and a bare user object otherwise.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<User>,
}

impl TokenResponse {
    fn into_session(self) -> Option<AuthSession> {
        Some(AuthSession {
            access_token: self.access_token?,
            refresh_token: self.refresh_token?,
            expires_at: self.expires_at,
            user: self.user?,
        })
    }
}

/// GoTrue and PostgREST use different error bodies; take the first message present.
#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "unknown error".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

/// Renders ids as a PostgREST `in` filter: `in.("a","b")`.
fn in_filter(ids: &[UserId]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "")))
        .collect();
    format!("in.({})", quoted.join(","))
}

// ============================================================================
// Backend Implementation
// ============================================================================

pub struct SupabaseBackend {
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
    client: reqwest::Client,
}

impl SupabaseBackend {
    /// Creates a backend for the project at `base_url` (e.g. `https://xyz.supabase.co`).
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token: RwLock::new(None),
            client: reqwest::Client::new(),
        }
    }

    fn current_token(&self) -> Option<String> {
        self.access_token
            .read()
            .map(|token| token.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn bearer(&self) -> String {
        format!(
            "Bearer {}",
            self.current_token().unwrap_or_else(|| self.anon_key.clone())
        )
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    /// Sends a request and turns non-2xx answers into `BackendError::Api`.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        debug!("Backend response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = error_message(&body);
            warn!("Backend API error: {} - {}", status, message);
            return Err(BackendError::Api { status, message });
        }

        Ok(response)
    }

    async fn select<T: for<'de> Deserialize<'de>>(
        &self,
        table: Table,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, self.rest_url(table))
            .query(query);
        let response = self.send(builder).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| BackendError::Parse(format!("{} rows: {e}", table.as_str())))
    }

    async fn token_grant<B: Serialize + ?Sized>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<AuthSession, BackendError> {
        let builder = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body);
        let response = self.send(builder).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(format!("token response: {e}")))?;
        let session = token
            .into_session()
            .ok_or_else(|| BackendError::Parse("token response without session".to_string()))?;
        self.set_access_token(Some(session.access_token.clone()));
        Ok(session)
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> Result<SignUpResponse, BackendError> {
        info!("Signing up {} as {}", email, profile.username);
        let builder = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&SignUpRequest {
                email,
                password,
                data: profile,
            });
        let response = self.send(builder).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(format!("sign-up response: {e}")))?;

        match token.into_session() {
            Some(session) => {
                self.set_access_token(Some(session.access_token.clone()));
                Ok(SignUpResponse::Session(session))
            }
            None => {
                info!("Sign-up for {} awaits confirmation", email);
                Ok(SignUpResponse::ConfirmationRequired)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        info!("Signing in {}", email);
        self.token_grant("password", &PasswordCredentials { email, password })
            .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        debug!("Refreshing session");
        self.token_grant("refresh_token", &RefreshRequest { refresh_token })
            .await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.current_token().is_none() {
            return Ok(());
        }
        let builder = self.request(reqwest::Method::POST, self.auth_url("logout"));
        let result = self.send(builder).await.map(|_| ());
        self.set_access_token(None);
        result
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<Message>, BackendError> {
        let mut messages: Vec<Message> = self
            .select(
                Table::Messages,
                &[
                    ("select", "*".to_string()),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        messages.reverse();
        debug!("Fetched {} messages", messages.len());
        Ok(messages)
    }

    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<Profile>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            Table::Profiles,
            &[("select", "*".to_string()), ("id", in_filter(ids))],
        )
        .await
    }

    async fn profile(&self, id: &str) -> Result<Option<Profile>, BackendError> {
        let rows: Vec<Profile> = self
            .select(
                Table::Profiles,
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{id}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn online_profiles(&self) -> Result<Vec<Profile>, BackendError> {
        self.select(
            Table::Profiles,
            &[
                ("select", "*".to_string()),
                ("is_online", "eq.true".to_string()),
                ("order", "username.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_message(&self, user_id: &str, content: &str) -> Result<(), BackendError> {
        if self.current_token().is_none() {
            return Err(BackendError::Unauthorized);
        }
        let builder = self
            .request(reqwest::Method::POST, self.rest_url(Table::Messages))
            .header("Prefer", "return=minimal")
            .json(&NewMessage { user_id, content });
        self.send(builder).await.map(|_| ())
    }

    async fn update_presence(
        &self,
        user_id: &str,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<(), BackendError> {
        let builder = self
            .request(reqwest::Method::PATCH, self.rest_url(Table::Profiles))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=minimal")
            .json(&PresenceUpdate {
                is_online,
                last_seen,
            });
        self.send(builder).await.map(|_| ())
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: ChangeFilter,
    ) -> Result<Subscription, BackendError> {
        let spec = ChannelSpec {
            ws_url: realtime::websocket_url(&self.base_url, &self.anon_key)?,
            topic: format!("realtime:{}-{}", table.as_str(), uuid::Uuid::new_v4()),
            table,
            filter,
            access_token: self.current_token(),
        };
        realtime::subscribe(spec).await
    }
}
