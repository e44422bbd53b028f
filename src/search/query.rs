//! Search query parser.
//!
//! Parses user-typed query strings into a structured [`ParsedQuery`].
//!
//! # Supported syntax
//!
//! **Simple search**: `alpha` matches subject and body tokens.
//!
//! **Phrases**: `"weekly sync"` matches consecutive tokens; an unterminated quote
//! runs to the end of the input.
//!
//! **Field-specific**:
//! - `from:bob@example.com` / `from:alice`
//! - `to:team@example.com`
//! - `subject:invoice` / `subject:"quarterly report"`
//!
//! **Status**: `is:unread`, `is:read`, `is:starred`, `is:unstarred`,
//! `has:attachment`, `has:replies`
//!
//! **Dates**: `after:2024-01-01` (inclusive), `before:2024-06-01` (exclusive);
//! `YYYY/MM/DD`, `YYYY-MM` and `YYYY` are accepted too.
//!
//! All clauses are AND-combined. `OR`, `NOT`, `-term`, parenthesised groups,
//! fields outside the list above and unknown `is:`/`has:` values are kept as
//! [`Clause::Unsupported`] so the caller can hand the query to the remote
//! search backend instead.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Message attribute targeted by a `field:value` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    From,
    To,
    Subject,
}

impl SearchField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Subject => "subject",
        }
    }
}

/// Flag-based filter from `is:` and `has:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Unread,
    Read,
    Starred,
    Unstarred,
    HasAttachment,
    HasReplies,
}

impl StatusKind {
    fn operator(self) -> &'static str {
        match self {
            Self::Unread => "is:unread",
            Self::Read => "is:read",
            Self::Starred => "is:starred",
            Self::Unstarred => "is:unstarred",
            Self::HasAttachment => "has:attachment",
            Self::HasReplies => "has:replies",
        }
    }
}

/// Syntax the local engine recognizes but cannot evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsupportedOperator {
    /// Boolean `OR` between terms.
    Or,
    /// `NOT term` or `-term`.
    Not { term: String },
    /// Parenthesised grouping.
    Group { text: String },
    /// A field outside the closed set, or an unknown `is:`/`has:` value.
    Field { field: String, value: String },
}

/// One AND-combined query clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    FreeTerm { text: String },
    Phrase { text: String },
    FieldFilter { field: SearchField, value: String },
    StatusFilter { kind: StatusKind },
    /// Inclusive calendar-day bounds in UTC; `None` is open-ended.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Unsupported { operator: UnsupportedOperator },
}

/// A fully parsed search query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    pub clauses: Vec<Clause>,
}

impl ParsedQuery {
    /// An empty query matches nothing.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn has_unsupported_operators(&self) -> bool {
        self.clauses
            .iter()
            .any(|c| matches!(c, Clause::Unsupported { .. }))
    }
}

/// Whether the query contains anything the local engine cannot evaluate.
///
/// Depends only on the parsed structure, never on index state.
pub fn has_unsupported_operators(query: &ParsedQuery) -> bool {
    query.has_unsupported_operators()
}

/// Parse a query string into a structured [`ParsedQuery`].
///
/// Never fails: malformed filters degrade to plain text search.
pub fn parse_query(input: &str) -> ParsedQuery {
    let clauses = tokenize(input.trim())
        .into_iter()
        .filter_map(|token| classify(&token))
        .collect();
    ParsedQuery { clauses }
}

fn classify(token: &str) -> Option<Clause> {
    match token {
        "AND" => return None,
        "OR" | "|" => return Some(unsupported(UnsupportedOperator::Or)),
        "NOT" => {
            return Some(unsupported(UnsupportedOperator::Not {
                term: String::new(),
            }))
        }
        _ => {}
    }

    if let Some(rest) = token.strip_prefix('"') {
        let text = rest.strip_suffix('"').unwrap_or(rest).trim();
        return (!text.is_empty()).then(|| Clause::Phrase {
            text: text.to_string(),
        });
    }

    if token.starts_with('(') || token.ends_with(')') {
        return Some(unsupported(UnsupportedOperator::Group {
            text: token.to_string(),
        }));
    }

    if let Some(term) = token.strip_prefix('-').filter(|t| !t.is_empty()) {
        return Some(unsupported(UnsupportedOperator::Not {
            term: term.to_string(),
        }));
    }

    // `scheme://...` is a URL, not an operator.
    if let Some((name, value)) = token.split_once(':').filter(|(_, v)| !v.starts_with("//")) {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(field_clause(token, &name.to_ascii_lowercase(), value));
        }
    }

    Some(free_term(token))
}

/// Resolve `name:value`. Unknown names fail closed into `Unsupported`.
fn field_clause(literal: &str, name: &str, value: &str) -> Clause {
    let value = unquote(value);
    if value.is_empty() {
        return free_term(literal);
    }

    let field = match name {
        "from" => Some(SearchField::From),
        "to" => Some(SearchField::To),
        "subject" => Some(SearchField::Subject),
        _ => None,
    };
    if let Some(field) = field {
        return Clause::FieldFilter {
            field,
            value: value.to_string(),
        };
    }

    let status = match (name, value.to_ascii_lowercase().as_str()) {
        ("is", "unread") => Some(StatusKind::Unread),
        ("is", "read") => Some(StatusKind::Read),
        ("is", "starred") => Some(StatusKind::Starred),
        ("is", "unstarred") => Some(StatusKind::Unstarred),
        ("has", "attachment" | "attachments") => Some(StatusKind::HasAttachment),
        ("has", "replies" | "reply") => Some(StatusKind::HasReplies),
        _ => None,
    };
    if let Some(kind) = status {
        return Clause::StatusFilter { kind };
    }

    match name {
        "after" => match parse_period_start(value) {
            Some(from) => Clause::DateRange {
                from: Some(from),
                to: None,
            },
            None => free_term(literal),
        },
        "before" => match parse_period_start(value).and_then(|d| d.pred_opt()) {
            Some(to) => Clause::DateRange {
                from: None,
                to: Some(to),
            },
            None => free_term(literal),
        },
        _ => unsupported(UnsupportedOperator::Field {
            field: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn free_term(text: &str) -> Clause {
    Clause::FreeTerm {
        text: text.to_string(),
    }
}

fn unsupported(operator: UnsupportedOperator) -> Clause {
    Clause::Unsupported { operator }
}

/// Strip one pair of surrounding quotes (or a dangling opening quote).
fn unquote(value: &str) -> &str {
    match value.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"').unwrap_or(rest).trim(),
        None => value,
    }
}

/// Split on whitespace outside double quotes. An unterminated quote runs
/// to the end of the input.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// First day of the period named by `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY-MM` or `YYYY`.
fn parse_period_start(s: &str) -> Option<NaiveDate> {
    let s = s.replace('/', "-");
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Some(d);
    }
    let parts: Vec<&str> = s.split('-').collect();
    match parts.as_slice() {
        [year, month] => {
            NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
        }
        [year] if year.len() == 4 => NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1),
        _ => None,
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreeTerm { text } => f.write_str(text),
            Self::Phrase { text } => write!(f, "\"{text}\""),
            Self::FieldFilter { field, value } if value.contains(char::is_whitespace) => {
                write!(f, "{}:\"{value}\"", field.as_str())
            }
            Self::FieldFilter { field, value } => write!(f, "{}:{value}", field.as_str()),
            Self::StatusFilter { kind } => f.write_str(kind.operator()),
            Self::DateRange { from, to } => {
                let mut parts = Vec::new();
                if let Some(from) = from {
                    parts.push(format!("after:{from}"));
                }
                if let Some(before) = to.and_then(|d| d.checked_add_days(Days::new(1))) {
                    parts.push(format!("before:{before}"));
                }
                f.write_str(&parts.join(" "))
            }
            Self::Unsupported { operator } => match operator {
                UnsupportedOperator::Or => f.write_str("OR"),
                UnsupportedOperator::Not { term } if term.is_empty() => f.write_str("NOT"),
                UnsupportedOperator::Not { term } => write!(f, "-{term}"),
                UnsupportedOperator::Group { text } => f.write_str(text),
                UnsupportedOperator::Field { field, value } => write!(f, "{field}:{value}"),
            },
        }
    }
}

impl fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_simple_query() {
        let q = parse_query("alpha");
        assert_eq!(
            q.clauses,
            vec![Clause::FreeTerm {
                text: "alpha".into()
            }]
        );
        assert!(!q.has_unsupported_operators());
    }

    #[test]
    fn test_parse_field_query() {
        let q = parse_query("from:bob@example.com subject:budget to:team");
        assert_eq!(
            q.clauses,
            vec![
                Clause::FieldFilter {
                    field: SearchField::From,
                    value: "bob@example.com".into()
                },
                Clause::FieldFilter {
                    field: SearchField::Subject,
                    value: "budget".into()
                },
                Clause::FieldFilter {
                    field: SearchField::To,
                    value: "team".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_field_name_case_insensitive() {
        let q = parse_query("FROM:bob IS:Unread");
        assert!(matches!(
            q.clauses[0],
            Clause::FieldFilter {
                field: SearchField::From,
                ..
            }
        ));
        assert_eq!(
            q.clauses[1],
            Clause::StatusFilter {
                kind: StatusKind::Unread
            }
        );
    }

    #[test]
    fn test_parse_status_filters() {
        let q = parse_query("is:unread is:starred has:attachment has:replies is:read");
        let kinds: Vec<StatusKind> = q
            .clauses
            .iter()
            .filter_map(|c| match c {
                Clause::StatusFilter { kind } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                StatusKind::Unread,
                StatusKind::Starred,
                StatusKind::HasAttachment,
                StatusKind::HasReplies,
                StatusKind::Read,
            ]
        );
    }

    #[test]
    fn test_parse_quoted_phrase() {
        let q = parse_query("\"weekly sync\" notes");
        assert_eq!(
            q.clauses,
            vec![
                Clause::Phrase {
                    text: "weekly sync".into()
                },
                Clause::FreeTerm {
                    text: "notes".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_unterminated_phrase_runs_to_end() {
        let q = parse_query("budget \"final numbers for q3");
        assert_eq!(
            q.clauses[1],
            Clause::Phrase {
                text: "final numbers for q3".into()
            }
        );
        assert_eq!(q.clauses.len(), 2);
    }

    #[test]
    fn test_parse_quoted_field_value() {
        let q = parse_query("subject:\"project alpha\"");
        assert_eq!(
            q.clauses,
            vec![Clause::FieldFilter {
                field: SearchField::Subject,
                value: "project alpha".into()
            }]
        );
    }

    #[test]
    fn test_parse_dates() {
        let q = parse_query("after:2024-01-15 before:2024/06/01");
        assert_eq!(
            q.clauses,
            vec![
                Clause::DateRange {
                    from: Some(date(2024, 1, 15)),
                    to: None
                },
                Clause::DateRange {
                    from: None,
                    to: Some(date(2024, 5, 31))
                },
            ]
        );
    }

    #[test]
    fn test_parse_partial_dates() {
        let q = parse_query("after:2024-03 before:2025");
        assert_eq!(
            q.clauses,
            vec![
                Clause::DateRange {
                    from: Some(date(2024, 3, 1)),
                    to: None
                },
                Clause::DateRange {
                    from: None,
                    to: Some(date(2024, 12, 31))
                },
            ]
        );
    }

    #[test]
    fn test_malformed_filters_degrade_to_free_text() {
        let q = parse_query("from: after:someday");
        assert_eq!(
            q.clauses,
            vec![
                Clause::FreeTerm {
                    text: "from:".into()
                },
                Clause::FreeTerm {
                    text: "after:someday".into()
                },
            ]
        );
        assert!(!q.has_unsupported_operators());
    }

    #[test]
    fn test_or_is_unsupported() {
        let q = parse_query("subject:alpha OR from:bob");
        assert!(has_unsupported_operators(&q));
        assert_eq!(q.clauses.len(), 3);
    }

    #[test]
    fn test_negation_and_grouping_unsupported() {
        assert!(parse_query("-spam").has_unsupported_operators());
        assert!(parse_query("NOT spam").has_unsupported_operators());
        assert!(parse_query("(alpha beta)").has_unsupported_operators());
    }

    #[test]
    fn test_unknown_field_unsupported() {
        let q = parse_query("label:inbox");
        assert_eq!(
            q.clauses,
            vec![Clause::Unsupported {
                operator: UnsupportedOperator::Field {
                    field: "label".into(),
                    value: "inbox".into()
                }
            }]
        );
        assert!(parse_query("is:important").has_unsupported_operators());
        assert!(parse_query("has:drive").has_unsupported_operators());
    }

    #[test]
    fn test_and_is_implicit() {
        let q = parse_query("alpha AND beta");
        assert_eq!(q.clauses.len(), 2);
        assert!(!q.has_unsupported_operators());
    }

    #[test]
    fn test_colon_in_plain_text() {
        let q = parse_query("12:30 standup");
        assert_eq!(
            q.clauses[0],
            Clause::FreeTerm {
                text: "12:30".into()
            }
        );
    }

    #[test]
    fn test_url_is_free_text() {
        let q = parse_query("https://example.com/page from:bob");
        assert!(!q.has_unsupported_operators());
        assert_eq!(
            q.clauses[0],
            Clause::FreeTerm {
                text: "https://example.com/page".into()
            }
        );
        assert!(!parse_query("ftp://files.example.org").has_unsupported_operators());
        assert!(parse_query("label:x//y").has_unsupported_operators());
    }

    #[test]
    fn test_parse_empty_query() {
        assert!(parse_query("").is_empty());
        assert!(parse_query("   \t ").is_empty());
        assert!(parse_query("\"\"").is_empty());
    }

    #[test]
    fn test_display_roundtrip() {
        let raw = "alpha \"weekly sync\" from:bob subject:\"q3 plan\" is:unread after:2024-01-01 before:2024-02-01";
        let q = parse_query(raw);
        assert_eq!(q.to_string(), raw);
        assert_eq!(parse_query(&q.to_string()), q);
    }

    #[test]
    fn test_unsupported_is_deterministic() {
        let raw = "subject:alpha OR from:bob";
        assert_eq!(
            has_unsupported_operators(&parse_query(raw)),
            has_unsupported_operators(&parse_query(raw))
        );
    }
}
