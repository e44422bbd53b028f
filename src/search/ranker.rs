//! Relevance ranking of messages against a parsed query.
//!
//! Candidates are the intersection of the messages satisfying every clause.
//! Each candidate is scored by weighted, log-damped term frequency (subject
//! above body, phrases above scattered terms) plus a bounded recency boost.
//! Results are ordered by score, then newest first, then by id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::RankingConfig;
use crate::error::{Result, SearchError};
use crate::index::postings::{FieldHits, InvertedIndex};
use crate::model::message::{IndexedMessage, MessageSummary};
use crate::search::query::{Clause, ParsedQuery, StatusKind};
use crate::search::tokenizer::{normalize, phrase_tokens};

/// Message id → accumulated score.
type Scores = HashMap<String, f64>;

/// Rank the messages matching `query`, best first, truncated to `limit`.
///
/// Empty queries and queries with unsupported operators match nothing.
/// A posting that points at a missing message aborts with
/// [`SearchError::InconsistentIndexState`].
pub fn rank_messages(
    index: &InvertedIndex,
    query: &ParsedQuery,
    weights: &RankingConfig,
    limit: usize,
) -> Result<Vec<MessageSummary>> {
    if limit == 0 || query.is_empty() || query.has_unsupported_operators() {
        return Ok(Vec::new());
    }

    let mut candidates: Option<Scores> = None;
    let mut filters: Vec<&Clause> = Vec::new();

    for clause in &query.clauses {
        let matched = match clause {
            Clause::FreeTerm { text } => {
                let tokens = normalize(text);
                if tokens.is_empty() {
                    continue;
                }
                let mut term_scores: Option<Scores> = None;
                for token in &tokens {
                    let hits = free_term_scores(index, token, weights)?;
                    term_scores = Some(intersect(term_scores, hits));
                }
                term_scores.unwrap_or_default()
            }
            Clause::Phrase { text } => {
                let tokens = phrase_tokens(text);
                if tokens.is_empty() {
                    continue;
                }
                phrase_scores(index, &tokens, weights)?
            }
            Clause::FieldFilter { field, value } => index
                .field_lookup(*field, value)
                .into_iter()
                .map(|id| (id, weights.field_match_weight))
                .collect(),
            Clause::StatusFilter { .. } | Clause::DateRange { .. } => {
                filters.push(clause);
                continue;
            }
            Clause::Unsupported { .. } => return Ok(Vec::new()),
        };

        let next = intersect(candidates.take(), matched);
        let exhausted = next.is_empty();
        candidates = Some(next);
        if exhausted {
            return Ok(Vec::new());
        }
    }

    let candidates = match candidates {
        Some(scored) => scored,
        None if filters.is_empty() => return Ok(Vec::new()),
        None => index.messages().map(|m| (m.id.clone(), 0.0)).collect(),
    };

    let newest = index.messages().map(|m| m.received).max();

    let mut ranked: Vec<(&IndexedMessage, f64)> = Vec::with_capacity(candidates.len());
    for (id, score) in candidates {
        let message = index
            .get(&id)
            .ok_or_else(|| SearchError::InconsistentIndexState {
                token: String::new(),
                message_id: id.clone(),
            })?;
        if !filters.iter().all(|f| passes_filter(message, f)) {
            continue;
        }
        let boost = newest.map_or(0.0, |n| recency_boost(n, message.received, weights));
        ranked.push((message, score + boost));
    }

    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.total_cmp(sa)
            .then_with(|| b.received.cmp(&a.received))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked.truncate(limit);

    Ok(ranked
        .into_iter()
        .map(|(message, score)| message.summary(score))
        .collect())
}

/// Scores for one normalized free-text token: exact token hits at full
/// weight, tokens merely containing it at `partial_match_factor`.
fn free_term_scores(
    index: &InvertedIndex,
    token: &str,
    weights: &RankingConfig,
) -> Result<Scores> {
    let mut scores = Scores::new();

    for (indexed, list) in index.tokens_containing(token) {
        let factor = if indexed == token {
            1.0
        } else {
            weights.partial_match_factor
        };
        for (id, hits) in list {
            if hits.text() == 0 {
                continue;
            }
            ensure_indexed(index, indexed, id)?;
            *scores.entry(id.clone()).or_default() += factor * text_score(hits, weights);
        }
    }

    Ok(scores)
}

/// Scores for a phrase: candidates must hold every token, then the
/// consecutive sequence is verified against the plain word sequence of
/// subject and body.
fn phrase_scores(
    index: &InvertedIndex,
    tokens: &[String],
    weights: &RankingConfig,
) -> Result<Scores> {
    let mut holders: Option<Scores> = None;
    for token in tokens {
        let mut with_token = Scores::new();
        if let Some(list) = index.lookup(token) {
            for (id, hits) in list {
                if hits.text() > 0 {
                    ensure_indexed(index, token, id)?;
                    with_token.insert(id.clone(), 0.0);
                }
            }
        }
        holders = Some(intersect(holders, with_token));
    }

    let mut scores = Scores::new();
    for id in holders.unwrap_or_default().into_keys() {
        let Some(message) = index.get(&id) else {
            continue;
        };
        let in_subject = count_sequence(&phrase_tokens(&message.subject), tokens);
        let in_body = count_sequence(&phrase_tokens(&message.snippet), tokens);
        if in_subject + in_body == 0 {
            continue;
        }
        // Credit every token of the phrase, then the phrase multiplier.
        let score = weights.phrase_weight
            * tokens.len() as f64
            * (damped(in_subject) * weights.subject_weight
                + damped(in_body) * weights.body_weight);
        scores.insert(id, score);
    }
    Ok(scores)
}

fn ensure_indexed(index: &InvertedIndex, token: &str, id: &str) -> Result<()> {
    if index.contains(id) {
        Ok(())
    } else {
        Err(SearchError::InconsistentIndexState {
            token: token.to_string(),
            message_id: id.to_string(),
        })
    }
}

/// AND two score sets, summing scores of the survivors.
fn intersect(acc: Option<Scores>, next: Scores) -> Scores {
    match acc {
        None => next,
        Some(acc) => acc
            .into_iter()
            .filter_map(|(id, score)| next.get(&id).map(|extra| (id, score + extra)))
            .collect(),
    }
}

fn text_score(hits: &FieldHits, weights: &RankingConfig) -> f64 {
    damped(hits.subject) * weights.subject_weight + damped(hits.body) * weights.body_weight
}

/// `1 + ln(tf)`, zero for no hits.
fn damped(tf: u32) -> f64 {
    if tf == 0 {
        0.0
    } else {
        1.0 + f64::from(tf).ln()
    }
}

fn count_sequence(haystack: &[String], needle: &[String]) -> u32 {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    haystack.windows(needle.len()).filter(|w| *w == needle).count() as u32
}

const RECENCY_STEP_SHARE: f64 = 0.9;

/// Decreasing in age, never above `recency_max_boost`.
///
/// Age is measured from the newest indexed message, so repeated queries
/// against an unchanged index score identically.
fn recency_boost(newest: DateTime<Utc>, received: DateTime<Utc>, weights: &RankingConfig) -> f64 {
    if weights.recency_half_life_days <= 0.0 {
        return 0.0;
    }
    let age_days = (newest - received).num_seconds().max(0) as f64 / 86_400.0;
    recency_cap(weights) / (1.0 + age_days / weights.recency_half_life_days)
}

/// The configured boost, held below the smallest relevance step.
///
/// An exact body hit outscores a partial one by
/// `body_weight * (1 - partial_match_factor)`; the boost stays under that
/// gap so recency can only reorder results of equal relevance class.
fn recency_cap(weights: &RankingConfig) -> f64 {
    let step = weights.body_weight * (1.0 - weights.partial_match_factor);
    weights
        .recency_max_boost
        .min(step * RECENCY_STEP_SHARE)
        .max(0.0)
}

fn passes_filter(message: &IndexedMessage, clause: &Clause) -> bool {
    match clause {
        Clause::StatusFilter { kind } => match kind {
            StatusKind::Unread => message.flags.unread,
            StatusKind::Read => !message.flags.unread,
            StatusKind::Starred => message.flags.starred,
            StatusKind::Unstarred => !message.flags.starred,
            StatusKind::HasAttachment => message.flags.has_attachments,
            StatusKind::HasReplies => message.reply_count > 0,
        },
        Clause::DateRange { from, to } => {
            let day = message.received.date_naive();
            from.map_or(true, |f| day >= f) && to.map_or(true, |t| day <= t)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::EmailAddress;
    use crate::search::query::parse_query;
    use chrono::TimeZone;

    fn msg(id: &str, subject: &str, body: &str, from: &str, day: u32) -> IndexedMessage {
        IndexedMessage::new(
            id,
            subject,
            body,
            EmailAddress::parse(from),
            Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap(),
        )
    }

    fn index_of(messages: Vec<IndexedMessage>) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for m in messages {
            index.add_or_update(m);
        }
        index
    }

    fn ids(index: &InvertedIndex, q: &str) -> Vec<String> {
        rank_messages(index, &parse_query(q), &RankingConfig::default(), 50)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn test_subject_outranks_body() {
        let index = index_of(vec![
            msg("body", "Status", "the budget is ready", "a@x.io", 5),
            msg("subj", "Budget", "see inside", "b@x.io", 5),
        ]);
        assert_eq!(ids(&index, "budget"), vec!["subj", "body"]);
    }

    #[test]
    fn test_and_semantics() {
        let index = index_of(vec![
            msg("m1", "Alpha launch", "", "a@x.io", 1),
            msg("m2", "Alpha", "beta notes", "a@x.io", 2),
            msg("m3", "Beta", "", "a@x.io", 3),
        ]);
        assert_eq!(ids(&index, "alpha beta"), vec!["m2"]);
    }

    #[test]
    fn test_substring_match_scores_below_exact() {
        let index = index_of(vec![
            msg("partial", "Alphabet soup", "", "a@x.io", 5),
            msg("exact", "Alpha plan", "", "a@x.io", 5),
        ]);
        assert_eq!(ids(&index, "alpha"), vec!["exact", "partial"]);
    }

    #[test]
    fn test_phrase_requires_adjacency_and_outranks_terms() {
        let index = index_of(vec![
            msg("scattered", "Sync about the weekly plan", "", "a@x.io", 5),
            msg("phrase", "Weekly sync", "", "a@x.io", 5),
        ]);
        assert_eq!(ids(&index, "\"weekly sync\""), vec!["phrase"]);

        let both = rank_messages(
            &index,
            &parse_query("weekly sync"),
            &RankingConfig::default(),
            10,
        )
        .unwrap();
        assert_eq!(both.len(), 2);

        let phrase = rank_messages(
            &index,
            &parse_query("\"weekly sync\""),
            &RankingConfig::default(),
            10,
        )
        .unwrap();
        let scattered_score = both.iter().find(|r| r.id == "scattered").unwrap().score;
        assert!(phrase[0].score > scattered_score);
    }

    #[test]
    fn test_phrase_spans_email_address() {
        let index = index_of(vec![msg(
            "m1",
            "Intro",
            "please email alice@example.com today",
            "a@x.io",
            5,
        )]);
        assert_eq!(ids(&index, "\"email alice\""), vec!["m1"]);
        assert_eq!(ids(&index, "\"alice example\""), vec!["m1"]);
        assert_eq!(ids(&index, "\"example com today\""), vec!["m1"]);
        assert_eq!(ids(&index, "\"email alice@example.com today\""), vec!["m1"]);
        assert!(ids(&index, "\"alice today\"").is_empty());
    }

    #[test]
    fn test_url_query_matches_link_text() {
        let index = index_of(vec![
            msg("link", "Docs", "see https://example.com/page for details", "a@x.io", 3),
            msg("other", "Docs", "see example.com/home", "a@x.io", 4),
        ]);
        assert_eq!(ids(&index, "https://example.com/page"), vec!["link"]);
        assert_eq!(ids(&index, "example.com/page"), vec!["link"]);
    }

    #[test]
    fn test_recency_breaks_equal_relevance() {
        let index = index_of(vec![
            msg("older", "Invoice", "", "a@x.io", 1),
            msg("newer", "Invoice", "", "a@x.io", 20),
        ]);
        assert_eq!(ids(&index, "invoice"), vec!["newer", "older"]);
    }

    #[test]
    fn test_old_exact_match_beats_fresh_partial() {
        let mut old = msg("old", "Status", "invoice attached", "a@x.io", 1);
        old.received = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let index = index_of(vec![
            old,
            msg("fresh", "Status", "invoices attached", "a@x.io", 30),
        ]);
        assert_eq!(ids(&index, "invoice"), vec!["old", "fresh"]);

        // Still holds when the configured boost is far above the gap.
        let weights = RankingConfig {
            recency_max_boost: 5.0,
            ..RankingConfig::default()
        };
        let rows = rank_messages(&index, &parse_query("invoice"), &weights, 10).unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["old", "fresh"]);
        assert!(recency_cap(&weights) < weights.body_weight * (1.0 - weights.partial_match_factor));
    }

    #[test]
    fn test_recency_is_bounded() {
        let weights = RankingConfig::default();
        let now = Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap();
        assert_eq!(recency_boost(now, now, &weights), weights.recency_max_boost);
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(recency_boost(now, old, &weights) < 0.05);
        // A strong subject match on an old message beats a fresh body match.
        let index = index_of(vec![
            msg("old", "Budget budget", "", "a@x.io", 1),
            msg("new", "Other", "budget", "a@x.io", 30),
        ]);
        assert_eq!(ids(&index, "budget"), vec!["old", "new"]);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let index = index_of(vec![
            msg("b", "Same", "", "a@x.io", 3),
            msg("a", "Same", "", "a@x.io", 3),
        ]);
        assert_eq!(ids(&index, "same"), vec!["a", "b"]);
    }

    #[test]
    fn test_status_and_date_filters() {
        let mut unread = msg("m1", "Report", "", "a@x.io", 2);
        unread.flags.unread = true;
        let mut starred = msg("m2", "Report", "", "a@x.io", 15);
        starred.flags.starred = true;
        starred.reply_count = 2;
        let index = index_of(vec![unread, starred]);

        assert_eq!(ids(&index, "is:unread"), vec!["m1"]);
        assert_eq!(ids(&index, "is:read"), vec!["m2"]);
        assert_eq!(ids(&index, "report is:starred"), vec!["m2"]);
        assert_eq!(ids(&index, "has:replies"), vec!["m2"]);
        assert_eq!(ids(&index, "after:2024-04-10"), vec!["m2"]);
        assert_eq!(ids(&index, "before:2024-04-15"), vec!["m1"]);
        assert_eq!(ids(&index, "after:2024-04-02 before:2024-04-03"), vec!["m1"]);
        assert!(ids(&index, "has:attachment").is_empty());
    }

    #[test]
    fn test_field_filters() {
        let index = index_of(vec![
            msg("m1", "Alpha", "", "alice@example.com", 1),
            msg("m2", "Sync", "", "bob@example.com", 2),
        ]);
        assert_eq!(ids(&index, "from:bob@example.com"), vec!["m2"]);
        assert_eq!(ids(&index, "from:alice subject:alpha"), vec!["m1"]);
        assert!(ids(&index, "from:carol").is_empty());
    }

    #[test]
    fn test_empty_unsupported_and_limit() {
        let index = index_of(vec![
            msg("m1", "Alpha", "", "a@x.io", 1),
            msg("m2", "Alpha", "", "a@x.io", 2),
        ]);
        assert!(ids(&index, "").is_empty());
        assert!(ids(&index, "!!!").is_empty());
        assert!(ids(&index, "alpha OR beta").is_empty());

        let limited =
            rank_messages(&index, &parse_query("alpha"), &RankingConfig::default(), 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "m2");
    }

    #[test]
    fn test_sender_only_match_is_not_free_text() {
        let index = index_of(vec![msg("m1", "Hello", "", "alice@example.com", 1)]);
        assert!(ids(&index, "alice").is_empty());
        assert_eq!(ids(&index, "from:alice"), vec!["m1"]);
    }

    #[test]
    fn test_dangling_posting_is_reported() {
        let mut index = index_of(vec![msg("m1", "Alpha", "", "a@x.io", 1)]);
        index.corrupt_posting("alpha", "ghost");

        let err = rank_messages(
            &index,
            &parse_query("alpha"),
            &RankingConfig::default(),
            10,
        )
        .unwrap_err();
        assert!(err.requires_resync());
    }

    #[test]
    fn test_count_sequence() {
        let hay: Vec<String> = ["a", "b", "a", "b"].iter().map(|s| s.to_string()).collect();
        let needle: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(count_sequence(&hay, &needle), 2);
        assert_eq!(count_sequence(&needle, &hay), 0);
    }
}
