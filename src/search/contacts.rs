//! Contact ranking: top contacts by interaction frequency, and
//! type-ahead contact search by name or address.

use std::cmp::Ordering;

use crate::index::contacts::ContactTable;
use crate::model::contact::{ContactSummary, IndexedContact};
use crate::search::tokenizer::normalize;

/// How well a query matched a contact, best last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    /// Some query token occurs inside a contact token.
    Substring,
    /// Every query token starts some contact token.
    Prefix,
    /// Every query token equals some contact token.
    Full,
}

/// Most frequent senders, ties broken by most recent interaction then id.
pub fn top_contacts(table: &ContactTable, limit: usize) -> Vec<ContactSummary> {
    let mut contacts: Vec<&IndexedContact> = table.iter().collect();
    contacts.sort_by(|a, b| by_frequency(a, b));
    contacts.truncate(limit);
    contacts.into_iter().map(IndexedContact::summary).collect()
}

/// Contacts whose name or address matches `query`, best match first.
///
/// Match quality dominates; interaction count, then recency, then id
/// break ties. A blank query matches nothing.
pub fn search_contacts(table: &ContactTable, query: &str, limit: usize) -> Vec<ContactSummary> {
    let query_tokens = normalize(query);
    if query_tokens.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut matches: Vec<(MatchQuality, &IndexedContact)> = table
        .iter()
        .filter_map(|contact| match_contact(contact, &query_tokens).map(|q| (q, contact)))
        .collect();

    matches.sort_by(|(qa, a), (qb, b)| qb.cmp(qa).then_with(|| by_frequency(a, b)));
    matches.truncate(limit);
    matches.into_iter().map(|(_, c)| c.summary()).collect()
}

/// Grade how `contact` matches. Each query token must match some contact
/// token; the weakest of those matches is the overall quality.
pub fn match_contact(contact: &IndexedContact, query_tokens: &[String]) -> Option<MatchQuality> {
    let mut contact_tokens = normalize(&contact.name);
    contact_tokens.extend(normalize(&contact.email));

    query_tokens
        .iter()
        .map(|q| best_token_match(&contact_tokens, q))
        .collect::<Option<Vec<MatchQuality>>>()?
        .into_iter()
        .min()
}

fn best_token_match(contact_tokens: &[String], query_token: &str) -> Option<MatchQuality> {
    contact_tokens
        .iter()
        .filter_map(|t| {
            if t == query_token {
                Some(MatchQuality::Full)
            } else if t.starts_with(query_token) {
                Some(MatchQuality::Prefix)
            } else if t.contains(query_token) {
                Some(MatchQuality::Substring)
            } else {
                None
            }
        })
        .max()
}

fn by_frequency(a: &IndexedContact, b: &IndexedContact) -> Ordering {
    b.interaction_count
        .cmp(&a.interaction_count)
        .then_with(|| b.last_interaction.cmp(&a.last_interaction))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::EmailAddress;
    use chrono::{TimeZone, Utc};

    fn table(entries: &[(&str, u32)]) -> ContactTable {
        let mut t = ContactTable::new();
        for (sender, day) in entries {
            t.record_interaction(
                &EmailAddress::parse(sender),
                Utc.with_ymd_and_hms(2024, 6, *day, 9, 0, 0).unwrap(),
            );
        }
        t
    }

    fn emails(rows: &[ContactSummary]) -> Vec<&str> {
        rows.iter().map(|r| r.email.as_str()).collect()
    }

    #[test]
    fn test_top_contacts_by_count() {
        let t = table(&[
            ("Alice <alice@example.com>", 1),
            ("Bob <bob@example.com>", 2),
            ("Alice <alice@example.com>", 3),
        ]);
        let top = top_contacts(&t, 2);
        assert_eq!(emails(&top), vec!["alice@example.com", "bob@example.com"]);
        assert_eq!(top[0].name, "Alice");
    }

    #[test]
    fn test_top_contacts_tie_breaks() {
        let t = table(&[("b@x.io", 5), ("a@x.io", 2), ("c@x.io", 5)]);
        assert_eq!(
            emails(&top_contacts(&t, 10)),
            vec!["b@x.io", "c@x.io", "a@x.io"]
        );
        assert_eq!(top_contacts(&t, 1).len(), 1);
    }

    #[test]
    fn test_search_match_quality_order() {
        let t = table(&[
            ("Annabel Lee <annabel@x.io>", 1),
            ("Ann Smith <ann@y.io>", 1),
            ("Joanne Park <jp@z.io>", 1),
            ("Zed <zed@z.io>", 1),
        ]);
        let rows = search_contacts(&t, "ann", 10);
        assert_eq!(emails(&rows), vec!["ann@y.io", "annabel@x.io", "jp@z.io"]);
    }

    #[test]
    fn test_search_count_breaks_quality_tie() {
        let t = table(&[
            ("Sam One <sam1@x.io>", 1),
            ("Sam Two <sam2@x.io>", 1),
            ("Sam Two <sam2@x.io>", 2),
        ]);
        let rows = search_contacts(&t, "sam", 10);
        assert_eq!(emails(&rows), vec!["sam2@x.io", "sam1@x.io"]);
    }

    #[test]
    fn test_search_multi_token_and_diacritics() {
        let t = table(&[("Zoë Martín <zoe@example.org>", 1), ("Zoe Park <zp@x.io>", 1)]);
        let rows = search_contacts(&t, "zoe mart", 10);
        assert_eq!(emails(&rows), vec!["zoe@example.org"]);
    }

    #[test]
    fn test_search_by_address_and_limit() {
        let t = table(&[("a1@corp.io", 1), ("a2@corp.io", 2), ("b@home.net", 3)]);
        let rows = search_contacts(&t, "corp", 1);
        assert_eq!(emails(&rows), vec!["a2@corp.io"]);
    }

    #[test]
    fn test_match_contact_needs_every_token() {
        let t = table(&[("Ann Smith <ann@y.io>", 1)]);
        let ann = t.iter().next().unwrap();
        let grade = |q: &str| match_contact(ann, &normalize(q));

        assert_eq!(grade("ann smith"), Some(MatchQuality::Full));
        assert_eq!(grade("ann smi"), Some(MatchQuality::Prefix));
        assert_eq!(grade("nn mit"), Some(MatchQuality::Substring));
        assert_eq!(grade("ann@y"), Some(MatchQuality::Prefix));
        // Text spanning the gap between name and address is not a match.
        assert_eq!(grade("smith ann@z"), None);
        assert_eq!(grade("annsmith"), None);
    }

    #[test]
    fn test_search_blank_query() {
        let t = table(&[("a@x.io", 1)]);
        assert!(search_contacts(&t, "", 5).is_empty());
        assert!(search_contacts(&t, "  ", 5).is_empty());
    }
}
