//! Inverted index over message text plus the message store it points into.
//!
//! Postings and the store are only ever mutated together, through the
//! methods on [`InvertedIndex`], so every message id in a posting list has
//! exactly one stored message.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::model::message::{FlagsUpdate, IndexedMessage};
use crate::search::query::SearchField;
use crate::search::tokenizer::normalize;

/// Occurrence counts of one token in one message, per field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldHits {
    pub subject: u32,
    pub body: u32,
    pub sender: u32,
    pub recipient: u32,
}

/// Which message attribute a token occurrence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTag {
    Subject,
    Body,
    Sender,
    Recipient,
}

impl FieldHits {
    fn bump(&mut self, tag: FieldTag) {
        let slot = match tag {
            FieldTag::Subject => &mut self.subject,
            FieldTag::Body => &mut self.body,
            FieldTag::Sender => &mut self.sender,
            FieldTag::Recipient => &mut self.recipient,
        };
        *slot += 1;
    }

    /// Hits in the searchable text (subject and body).
    pub fn text(&self) -> u32 {
        self.subject + self.body
    }

    /// Hits in the attribute a `field:value` filter targets.
    pub fn in_field(&self, field: SearchField) -> u32 {
        match field {
            SearchField::From => self.sender,
            SearchField::To => self.recipient,
            SearchField::Subject => self.subject,
        }
    }
}

/// Message id → hits for one token.
pub type Postings = HashMap<String, FieldHits>;

/// Token postings and the message store, kept in lock-step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    messages: HashMap<String, IndexedMessage>,
    postings: HashMap<String, Postings>,
    /// Distinct tokens per message, so removal touches only its own postings.
    forward: HashMap<String, Vec<String>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of distinct tokens.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&IndexedMessage> {
        self.messages.get(id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &IndexedMessage> {
        self.messages.values()
    }

    /// Insert a message, replacing any previous version with the same id.
    ///
    /// Returns `true` when an older version was replaced.
    pub fn add_or_update(&mut self, message: IndexedMessage) -> bool {
        let replaced = self.remove(&message.id).is_some();

        let mut hits: HashMap<String, FieldHits> = HashMap::new();
        for (tag, text) in tagged_fields(&message) {
            for token in normalize(text) {
                hits.entry(token).or_default().bump(tag);
            }
        }

        let mut tokens = Vec::with_capacity(hits.len());
        for (token, field_hits) in hits {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(message.id.clone(), field_hits);
            tokens.push(token);
        }

        self.forward.insert(message.id.clone(), tokens);
        self.messages.insert(message.id.clone(), message);
        replaced
    }

    /// Remove a message and all of its postings.
    pub fn remove(&mut self, id: &str) -> Option<IndexedMessage> {
        let message = self.messages.remove(id)?;

        for token in self.forward.remove(id).unwrap_or_default() {
            if let Some(list) = self.postings.get_mut(&token) {
                list.remove(id);
                if list.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }

        Some(message)
    }

    /// Flag-only fast path: no re-tokenizing.
    ///
    /// Returns `None` if the message is not indexed, otherwise whether any
    /// flag actually changed.
    pub fn update_flags(&mut self, id: &str, update: FlagsUpdate) -> Option<bool> {
        self.messages
            .get_mut(id)
            .map(|message| message.flags.apply(update))
    }

    /// Drop every message received before `cutoff`; returns the removed ids.
    pub fn remove_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .messages
            .values()
            .filter(|m| m.received < cutoff)
            .map(|m| m.id.clone())
            .collect();
        expired.sort();

        for id in &expired {
            self.remove(id);
        }
        debug!(count = expired.len(), cutoff = %cutoff, "Expired messages");
        expired
    }

    /// Postings for an already-normalized token.
    pub fn lookup(&self, token: &str) -> Option<&Postings> {
        self.postings.get(token)
    }

    /// Every vocabulary token containing `fragment`, with its postings.
    ///
    /// Linear in the vocabulary size.
    pub fn tokens_containing<'a>(
        &'a self,
        fragment: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Postings)> + 'a {
        self.postings
            .iter()
            .filter(move |(token, _)| token.contains(fragment))
            .map(|(token, list)| (token.as_str(), list))
    }

    /// Messages whose `field` contains every token of `value`.
    pub fn field_lookup(&self, field: SearchField, value: &str) -> HashSet<String> {
        let tokens = normalize(value);
        let mut result: Option<HashSet<String>> = None;

        for token in &tokens {
            let matching: HashSet<String> = self
                .lookup(token)
                .map(|list| {
                    list.iter()
                        .filter(|(_, hits)| hits.in_field(field) > 0)
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default();

            result = Some(match result {
                Some(acc) => acc.intersection(&matching).cloned().collect(),
                None => matching,
            });

            if result.as_ref().is_some_and(HashSet::is_empty) {
                break;
            }
        }

        result.unwrap_or_default()
    }

    /// Check that postings, forward map and message store agree.
    pub fn verify(&self) -> Result<()> {
        for (token, list) in &self.postings {
            if let Some(id) = list.keys().find(|id| !self.messages.contains_key(*id)) {
                return Err(SearchError::InconsistentIndexState {
                    token: token.clone(),
                    message_id: id.clone(),
                });
            }
        }

        for (id, tokens) in &self.forward {
            let dangling = !self.messages.contains_key(id)
                || tokens
                    .iter()
                    .any(|t| self.postings.get(t).map_or(true, |l| !l.contains_key(id)));
            if dangling {
                return Err(SearchError::InconsistentIndexState {
                    token: tokens.first().cloned().unwrap_or_default(),
                    message_id: id.clone(),
                });
            }
        }

        if self.forward.len() != self.messages.len() {
            let id = self
                .messages
                .keys()
                .find(|id| !self.forward.contains_key(*id))
                .cloned()
                .unwrap_or_default();
            return Err(SearchError::InconsistentIndexState {
                token: String::new(),
                message_id: id,
            });
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.postings.clear();
        self.forward.clear();
    }

    #[cfg(test)]
    pub(crate) fn corrupt_posting(&mut self, token: &str, id: &str) {
        self.postings
            .entry(token.to_string())
            .or_default()
            .insert(
                id.to_string(),
                FieldHits {
                    subject: 1,
                    ..FieldHits::default()
                },
            );
    }
}

fn tagged_fields(message: &IndexedMessage) -> Vec<(FieldTag, &str)> {
    let mut fields = vec![
        (FieldTag::Subject, message.subject.as_str()),
        (FieldTag::Body, message.snippet.as_str()),
        (FieldTag::Sender, message.from.display_name.as_str()),
        (FieldTag::Sender, message.from.address.as_str()),
    ];
    for rcpt in &message.to {
        fields.push((FieldTag::Recipient, rcpt.display_name.as_str()));
        fields.push((FieldTag::Recipient, rcpt.address.as_str()));
    }
    fields
}
