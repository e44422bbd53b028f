//! Indexed message types and the ranked summary handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;

/// Mutable per-message state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub unread: bool,
    pub starred: bool,
    pub has_attachments: bool,
}

/// A partial flag change. `None` leaves the current value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagsUpdate {
    #[serde(default)]
    pub unread: Option<bool>,
    #[serde(default)]
    pub starred: Option<bool>,
}

impl MessageFlags {
    /// Apply a partial update, returning whether anything changed.
    pub fn apply(&mut self, update: FlagsUpdate) -> bool {
        let before = *self;
        if let Some(unread) = update.unread {
            self.unread = unread;
        }
        if let Some(starred) = update.starred {
            self.starred = starred;
        }
        before != *self
    }
}

/// A message as held by the index.
///
/// The body is the short snippet the mailbox store hands out, not the full
/// MIME body; only the flags ever change after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedMessage {
    /// Stable identifier assigned by the mailbox store.
    pub id: String,
    pub subject: String,
    pub snippet: String,
    pub from: EmailAddress,
    /// Primary recipients (`To:`).
    pub to: Vec<EmailAddress>,
    pub received: DateTime<Utc>,
    pub flags: MessageFlags,
    /// Number of replies in the thread rooted at this message.
    pub reply_count: u32,
}

impl IndexedMessage {
    /// Minimal constructor; recipients, flags and reply count start empty.
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        snippet: impl Into<String>,
        from: EmailAddress,
        received: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            snippet: snippet.into(),
            from,
            to: Vec::new(),
            received,
            flags: MessageFlags::default(),
            reply_count: 0,
        }
    }

    /// Build the caller-facing row for this message with its score.
    pub fn summary(&self, score: f64) -> MessageSummary {
        MessageSummary {
            id: self.id.clone(),
            subject: self.subject.clone(),
            snippet: self.snippet.clone(),
            sender_name: self.from.display_name.clone(),
            sender_email: self.from.address.clone(),
            received: self.received,
            unread: self.flags.unread,
            starred: self.flags.starred,
            reply_count: self.reply_count,
            score,
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub snippet: String,
    pub sender_name: String,
    pub sender_email: String,
    pub received: DateTime<Utc>,
    pub unread: bool,
    pub starred: bool,
    pub reply_count: u32,
    pub score: f64,
}
