//! Mailbox change feed: one JSON object per line.
//!
//! ```text
//! {"op":"add","id":"m1","subject":"Hi","from":"Ann <ann@x.io>","received":"2024-05-01T09:00:00Z"}
//! {"op":"flags","id":"m1","unread":false}
//! {"op":"delete","id":"m1"}
//! {"op":"expire","older_than":"2023-01-01T00:00:00Z"}
//! {"op":"resync","messages":[...]}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::index::maintainer::{self, MailboxChange};
use crate::index::MailIndex;
use crate::model::address::EmailAddress;
use crate::model::message::{FlagsUpdate, IndexedMessage, MessageFlags};

/// A message as written in the feed. Addresses are raw header values.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedMessage {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub received: DateTime<Utc>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(default)]
    pub reply_count: u32,
}

impl From<FeedMessage> for IndexedMessage {
    fn from(m: FeedMessage) -> Self {
        IndexedMessage {
            id: m.id,
            subject: m.subject,
            snippet: m.snippet,
            from: EmailAddress::parse(&m.from),
            to: EmailAddress::parse_list(&m.to),
            received: m.received,
            flags: MessageFlags {
                unread: m.unread,
                starred: m.starred,
                has_attachments: m.has_attachments,
            },
            reply_count: m.reply_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum FeedLine {
    Add(FeedMessage),
    Flags {
        id: String,
        #[serde(default)]
        unread: Option<bool>,
        #[serde(default)]
        starred: Option<bool>,
    },
    Delete {
        id: String,
    },
    Expire {
        older_than: DateTime<Utc>,
    },
    Resync {
        #[serde(default)]
        messages: Vec<FeedMessage>,
    },
}

impl From<FeedLine> for MailboxChange {
    fn from(line: FeedLine) -> Self {
        match line {
            FeedLine::Add(m) => MailboxChange::Added(m.into()),
            FeedLine::Flags { id, unread, starred } => MailboxChange::FlagsChanged {
                id,
                update: FlagsUpdate { unread, starred },
            },
            FeedLine::Delete { id } => MailboxChange::Deleted { id },
            FeedLine::Expire { older_than } => MailboxChange::Expired { older_than },
            FeedLine::Resync { messages } => {
                MailboxChange::Resync(messages.into_iter().map(Into::into).collect())
            }
        }
    }
}

/// Parse one feed line. `line_no` is 1-based and only used for errors.
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<MailboxChange>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let parsed: FeedLine = serde_json::from_str(trimmed).map_err(|e| SearchError::InvalidFeed {
        line: line_no,
        reason: e.to_string(),
    })?;
    Ok(Some(parsed.into()))
}

/// Parse every change from a reader, in order.
pub fn read_feed(reader: impl BufRead) -> Result<Vec<MailboxChange>> {
    let mut changes = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SearchError::InvalidFeed {
            line: i + 1,
            reason: e.to_string(),
        })?;
        if let Some(change) = parse_line(i + 1, &line)? {
            changes.push(change);
        }
    }
    debug!(changes = changes.len(), "Parsed change feed");
    Ok(changes)
}

/// Read and parse a feed file.
pub fn load_feed(path: &Path) -> Result<Vec<MailboxChange>> {
    let file = std::fs::File::open(path).map_err(|e| SearchError::io(path, e))?;
    read_feed(std::io::BufReader::new(file))
}

/// Apply `changes` in order to an empty index.
///
/// `progress` is called with `(applied, total)` after each change.
pub fn replay(
    changes: Vec<MailboxChange>,
    progress: Option<&dyn Fn(usize, usize)>,
) -> MailIndex {
    let total = changes.len();
    let mut index = MailIndex::new();
    for (i, change) in changes.into_iter().enumerate() {
        maintainer::apply(&mut index, change);
        if let Some(cb) = progress {
            cb(i + 1, total);
        }
    }
    index
}
