//! Row and event types exchanged with the hosted backend.
//!
//! Field names follow the table columns (`snake_case` in Postgres), so most
//! types deserialize straight from PostgREST rows and Realtime records.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use super::service::BackendError;

/// Opaque identifier issued by the auth service.
pub type UserId = String;

/// Identity of the signed-in user. Owned by the auth service, never mutated here.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Display profile of a user (`profiles` table).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    pub username: String,
    pub avatar_color: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Upper-cased first character of the username, used as the avatar glyph.
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }

    /// Whether the profile counts as online at `now`.
    ///
    /// The flag alone is not trusted: a client that vanished without marking
    /// itself offline stops refreshing `last_seen`, so the lease runs out.
    /// `last_seen` comes from the writer's clock; skew between clients eats
    /// into the lease.
    pub fn is_present(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        if !self.is_online {
            return false;
        }
        match self.last_seen {
            Some(seen) => now.signed_duration_since(seen) <= lease,
            None => false,
        }
    }
}

/// A chat message (`messages` table). Immutable once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub user_id: UserId,
    pub content: String,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new message. The service fills `id` and `created_at`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewMessage<'a> {
    pub user_id: &'a str,
    pub content: &'a str,
}

/// Partial profile update written by the heartbeat and sign-out.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PresenceUpdate {
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Profile attributes passed as user metadata on sign-up.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SignUpProfile {
    pub username: String,
    pub avatar_color: String,
}

/// Tokens plus identity for an authenticated session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

/// Tables the client reads from and subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Messages,
    Profiles,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Messages => "messages",
            Table::Profiles => "profiles",
        }
    }
}

/// Which row events a subscription wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    Insert,
    Any,
}

impl ChangeFilter {
    /// Event name in the Realtime `postgres_changes` config.
    pub fn as_event(self) -> &'static str {
        match self {
            ChangeFilter::Insert => "INSERT",
            ChangeFilter::Any => "*",
        }
    }

    pub fn matches(self, kind: ChangeKind) -> bool {
        match self {
            ChangeFilter::Insert => kind == ChangeKind::Insert,
            ChangeFilter::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row change delivered by the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
    pub old_record: serde_json::Value,
}

impl ChangeEvent {
    /// Decode the new row image into a typed record.
    pub fn decode_record<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        serde_json::from_value(self.record.clone())
            .map_err(|e| BackendError::Parse(format!("{} record: {e}", self.table)))
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parses the timestamp shapes Postgres hands out: RFC 3339 with an offset,
/// `+00`-style short offsets, or naive values (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = raw.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
        None => Ok(None),
    }
}
