//! Text normalization shared by the indexer, the query parser and contact search.
//!
//! Folding is NFKD decomposition with combining marks dropped, then
//! lower-casing, so `"Zoë"`, `"ZOE"` and `"zoe"` all produce `zoe`.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-case and strip diacritics without splitting.
pub fn fold(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Turn raw text into the token stream used for indexing and matching.
///
/// Tokens keep their multiplicity and order. Email addresses additionally
/// yield the whole address, the local part and the domain, so
/// `alice@example.com` is findable by `alice`, `example` or the full address.
pub fn normalize(text: &str) -> Vec<String> {
    let folded = fold(text);
    let mut tokens = Vec::new();

    for chunk in folded.split_whitespace() {
        let chunk = trim_edges(chunk);
        if chunk.is_empty() {
            continue;
        }

        match split_email(chunk) {
            Some((local, domain)) => {
                tokens.push(chunk.to_string());
                push_with_pieces(&mut tokens, local);
                push_with_pieces(&mut tokens, domain);
            }
            None => tokens.extend(pieces(chunk)),
        }
    }

    tokens
}

/// Plain word sequence for phrase matching.
///
/// Same folding as [`normalize`], but an address contributes only its
/// alphanumeric runs in order, so `email alice@example.com` reads as
/// `email alice example com`.
pub fn phrase_tokens(text: &str) -> Vec<String> {
    fold(text)
        .split_whitespace()
        .flat_map(|chunk| pieces(chunk).collect::<Vec<_>>())
        .collect()
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Alphanumeric runs of `s`.
fn pieces(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Push `part` itself, then its alphanumeric runs when it has more than one.
fn push_with_pieces(tokens: &mut Vec<String>, part: &str) {
    let part = trim_edges(part);
    if part.is_empty() {
        return;
    }
    tokens.push(part.to_string());

    let runs: Vec<String> = pieces(part).collect();
    if runs.len() > 1 {
        tokens.extend(runs);
    }
}

fn split_email(chunk: &str) -> Option<(&str, &str)> {
    let (local, domain) = chunk.split_once('@')?;
    if domain.contains('@') {
        return None;
    }
    let has_alnum = |s: &str| s.chars().any(char::is_alphanumeric);
    (has_alnum(local) && has_alnum(domain)).then_some((local, domain))
}
