//! Sender and recipient addresses as delivered by the mailbox change feed.

use serde::{Deserialize, Serialize};

/// A sender or recipient address.
///
/// # Examples
/// - `"Zoë Martín <zoe@example.org>"` → `display_name = "Zoë Martín"`, `address = "zoe@example.org"`
/// - `"bob@example.com"` → `display_name = ""`, `address = "bob@example.com"`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`).
    pub address: String,
}

impl EmailAddress {
    /// Build an address from already-separated parts.
    pub fn new(display_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into().trim().to_string(),
            address: address.into().trim().to_string(),
        }
    }

    /// Parse a single header-style address.
    ///
    /// Accepts `user@domain`, `<user@domain>`, `Name <user@domain>` and
    /// `"Quoted, Name" <user@domain>`. Anything else is kept verbatim as the
    /// address so nothing the feed sends is lost.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        let angled = trimmed
            .rfind('<')
            .zip(trimmed.rfind('>'))
            .filter(|(open, close)| close > open);

        match angled {
            Some((open, close)) => Self::new(
                unquote(&trimmed[..open]),
                &trimmed[open + 1..close],
            ),
            None => Self::new("", trimmed),
        }
    }

    /// Parse a comma-separated recipient list.
    ///
    /// Commas inside quotes or angle brackets do not split entries.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut in_quotes = false;
        let mut depth = 0usize;

        for (i, ch) in raw.char_indices() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => depth += 1,
                '>' if !in_quotes => depth = depth.saturating_sub(1),
                ',' if !in_quotes && depth == 0 => {
                    out.push(Self::parse(&raw[start..i]));
                    start = i + 1;
                }
                _ => {}
            }
        }
        out.push(Self::parse(&raw[start..]));

        out.retain(|a| !a.address.is_empty());
        out
    }

    /// Format as `"Display Name <address>"` or just `"address"`.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map_or(s, str::trim)
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
