//! The mutable search state: postings, message store and contacts.

pub mod contacts;
pub mod format;
pub mod maintainer;
pub mod postings;
pub mod snapshot;
pub mod stats;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::model::message::IndexedMessage;

use self::contacts::ContactTable;
use self::postings::InvertedIndex;

/// Everything one update must change atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailIndex {
    pub messages: InvertedIndex,
    pub contacts: ContactTable,
}

impl MailIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index from a complete message set.
    ///
    /// Later duplicates of an id replace earlier ones and are counted once
    /// toward their sender's interactions.
    pub fn from_messages(messages: impl IntoIterator<Item = IndexedMessage>) -> Self {
        let mut index = Self::new();
        for message in messages {
            index.ingest(message);
        }
        info!(
            messages = index.messages.len(),
            contacts = index.contacts.len(),
            tokens = index.messages.vocabulary_size(),
            "Built index"
        );
        index
    }

    /// Add or replace a message; a new id counts as one sender interaction.
    ///
    /// Returns `true` when an older version was replaced.
    pub fn ingest(&mut self, message: IndexedMessage) -> bool {
        let sender = message.from.clone();
        let received = message.received;
        let replaced = self.messages.add_or_update(message);
        if !replaced {
            self.contacts.record_interaction(&sender, received);
        }
        replaced
    }

    /// Full consistency check; any error means the instance needs a resync.
    pub fn verify(&self) -> Result<()> {
        self.messages.verify()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.contacts.clear();
    }
}
