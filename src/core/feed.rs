//! # Message Feed
//!
//! The single room's message list. A bulk load seeds it, live inserts append
//! to it, and a message only becomes visible once its author's profile is in
//! the [`ProfileCache`].
//!
//! ```text
//! load:   recent_messages(N) ──► uncached authors ──► profiles(ids)
//! insert: append ──► author cached? ──no──► profile(id)
//! ```
//!
//! The live stream is trusted to deliver in creation order. Redelivered events
//! are kept as-is, so the same row can show twice.

use log::{debug, info};

use crate::backend::{Backend, BackendError, Message, Profile, UserId};
use crate::core::profiles::ProfileCache;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Result of a bulk load: messages in ascending creation order plus the
/// profiles of their authors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedSnapshot {
    pub messages: Vec<Message>,
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Default)]
pub struct Feed {
    messages: Vec<Message>,
    /// A send is in flight; further sends are refused until it settles.
    pub sending: bool,
    pub load_state: LoadState,
}

impl Feed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.load_state == LoadState::Loading
    }

    pub fn begin_load(&mut self) {
        self.load_state = LoadState::Loading;
    }

    /// Installs a loaded snapshot. Messages that arrived live while the load
    /// was in flight and are missing from the snapshot go after it.
    pub fn apply_snapshot(&mut self, snapshot: Vec<Message>) {
        let live = std::mem::replace(&mut self.messages, snapshot);
        let carried: Vec<Message> = live
            .into_iter()
            .filter(|m| !self.messages.iter().any(|loaded| loaded.id == m.id))
            .collect();
        if !carried.is_empty() {
            debug!("Keeping {} live messages received during load", carried.len());
        }
        self.messages.extend(carried);
        self.load_state = LoadState::Loaded;
    }

    pub fn fail_load(&mut self, reason: String) {
        self.load_state = LoadState::Failed(reason);
    }

    /// Appends a live insert at the tail.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Messages whose author is known, paired with that author, in list order.
    pub fn visible<'a>(
        &'a self,
        cache: &'a ProfileCache,
    ) -> impl Iterator<Item = (&'a Message, &'a Profile)> + 'a {
        self.messages
            .iter()
            .filter_map(move |m| cache.get(&m.user_id).map(|p| (m, p)))
    }

    /// Claims the send slot for `text`. Returns the trimmed content to insert,
    /// or `None` when the text is blank or another send is in flight.
    pub fn begin_send(&mut self, text: &str) -> Option<String> {
        if self.sending {
            return None;
        }
        let content = validate_outgoing(text)?;
        self.sending = true;
        Some(content.to_string())
    }

    pub fn finish_send(&mut self) {
        self.sending = false;
    }
}

/// Trimmed message body, or `None` if nothing is left to send.
pub fn validate_outgoing(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Fetches the most recent `limit` messages plus the authors `known` lacks,
/// in one bulk request. Makes no profile request when nothing is missing,
/// e.g. for an empty room.
pub async fn load_feed(
    backend: &dyn Backend,
    limit: usize,
    known: &ProfileCache,
) -> Result<FeedSnapshot, BackendError> {
    let messages = backend.recent_messages(limit).await?;
    let authors: Vec<UserId> = known.missing(messages.iter().map(|m| m.user_id.as_str()));
    let profiles = if authors.is_empty() {
        Vec::new()
    } else {
        backend.profiles(&authors).await?
    };
    info!(
        "Loaded {} messages, resolved {} of {} uncached authors",
        messages.len(),
        profiles.len(),
        authors.len()
    );
    Ok(FeedSnapshot { messages, profiles })
}
