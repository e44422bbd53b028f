//! Contact table built from message senders.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::address::EmailAddress;
use crate::model::contact::IndexedContact;
use crate::search::tokenizer::fold;

/// Contacts keyed by folded email address.
///
/// Counts only grow; the table is emptied only by [`ContactTable::clear`],
/// which a full resync uses before recounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactTable {
    contacts: HashMap<String, IndexedContact>,
}

impl ContactTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IndexedContact> {
        self.contacts.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedContact> {
        self.contacts.values()
    }

    /// Count one message from `sender` received at `at`.
    ///
    /// The most recent non-empty display name wins. Senders without an
    /// address are ignored.
    pub fn record_interaction(&mut self, sender: &EmailAddress, at: DateTime<Utc>) {
        let address = sender.address.trim();
        if address.is_empty() {
            return;
        }

        let id = fold(address);
        let contact = self
            .contacts
            .entry(id.clone())
            .or_insert_with(|| IndexedContact {
                id,
                name: String::new(),
                email: address.to_string(),
                interaction_count: 0,
                last_interaction: at,
            });

        let newest = at >= contact.last_interaction;
        if !sender.display_name.is_empty() && (newest || contact.name.is_empty()) {
            contact.name = sender.display_name.clone();
        }
        if newest {
            contact.last_interaction = at;
        }
        contact.interaction_count += 1;
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}
