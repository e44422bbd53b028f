//! Applies mailbox change notifications to a [`MailIndex`].
//!
//! Changes must be applied one at a time in arrival order: a flag change
//! that arrives after a delete is dropped, never resurrecting the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::message::{FlagsUpdate, IndexedMessage};

use super::MailIndex;

/// One notification from the mailbox change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MailboxChange {
    /// A message arrived (or was re-delivered with the same id).
    Added(IndexedMessage),
    /// Read/star state changed.
    FlagsChanged { id: String, update: FlagsUpdate },
    Deleted { id: String },
    /// Messages received before the cutoff left the searchable window.
    Expired { older_than: DateTime<Utc> },
    /// Replace everything with this complete message set.
    Resync(Vec<IndexedMessage>),
}

/// What applying a change did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Added,
    Replaced,
    FlagsUpdated { changed: bool },
    Removed { count: usize },
    Resynced { messages: usize },
    /// The change referenced a message the index does not hold.
    Dropped,
}

/// Apply a single change in place.
///
/// `Resync` is the only change that lowers contact interaction counts: the
/// table is cleared and recounted from the new message set.
pub fn apply(index: &mut MailIndex, change: MailboxChange) -> ApplyOutcome {
    match change {
        MailboxChange::Added(message) => {
            if index.ingest(message) {
                ApplyOutcome::Replaced
            } else {
                ApplyOutcome::Added
            }
        }
        MailboxChange::FlagsChanged { id, update } => {
            match index.messages.update_flags(&id, update) {
                Some(changed) => ApplyOutcome::FlagsUpdated { changed },
                None => {
                    debug!(id = %id, "Dropping flag change for unknown message");
                    ApplyOutcome::Dropped
                }
            }
        }
        MailboxChange::Deleted { id } => match index.messages.remove(&id) {
            Some(_) => ApplyOutcome::Removed { count: 1 },
            None => {
                debug!(id = %id, "Dropping delete for unknown message");
                ApplyOutcome::Dropped
            }
        },
        MailboxChange::Expired { older_than } => {
            let count = index.messages.remove_older_than(older_than).len();
            ApplyOutcome::Removed { count }
        }
        MailboxChange::Resync(messages) => {
            *index = MailIndex::from_messages(messages);
            let count = index.messages.len();
            info!(messages = count, "Resynced index");
            ApplyOutcome::Resynced { messages: count }
        }
    }
}
