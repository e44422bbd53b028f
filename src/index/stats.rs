//! Summary figures over the indexed mailbox.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::MailIndex;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub message_count: usize,
    pub contact_count: usize,
    /// Distinct normalized tokens.
    pub vocabulary_size: usize,
    pub unread: usize,
    pub starred: usize,
    pub with_attachments: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl IndexStats {
    pub fn collect(index: &MailIndex) -> Self {
        let mut stats = IndexStats {
            message_count: index.messages.len(),
            contact_count: index.contacts.len(),
            vocabulary_size: index.messages.vocabulary_size(),
            ..Default::default()
        };
        for msg in index.messages.messages() {
            stats.unread += usize::from(msg.flags.unread);
            stats.starred += usize::from(msg.flags.starred);
            stats.with_attachments += usize::from(msg.flags.has_attachments);
            stats.oldest = Some(stats.oldest.map_or(msg.received, |d| d.min(msg.received)));
            stats.newest = Some(stats.newest.map_or(msg.received, |d| d.max(msg.received)));
        }
        stats
    }

    /// Share of messages with attachments, in percent.
    pub fn attachment_ratio(&self) -> f64 {
        if self.message_count == 0 {
            0.0
        } else {
            self.with_attachments as f64 / self.message_count as f64 * 100.0
        }
    }
}
