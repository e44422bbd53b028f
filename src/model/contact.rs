//! Contacts derived from message senders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sender the user has received mail from.
///
/// Contacts are never deleted when their messages go away; they only fall
/// behind in ranking. The interaction count only resets on a full resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedContact {
    /// Folded (lower-cased, diacritic-free) email address.
    pub id: String,
    pub name: String,
    /// Address as first seen, original casing preserved.
    pub email: String,
    pub interaction_count: u64,
    pub last_interaction: DateTime<Utc>,
}

impl IndexedContact {
    pub fn summary(&self) -> ContactSummary {
        ContactSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Caller-facing contact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl ContactSummary {
    /// `Name <email>`, or the bare address when there is no name.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}
