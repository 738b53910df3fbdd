//! Lucene `query_string` escaping.

use crate::sigma::{Piece, SigmaString};

const RESERVED: &[char] = &[
    '\\', '+', '-', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~',
    '*', '?', ':', '/', ' ',
];

/// Escape every reserved character and whitespace so `s` is read as one term.
pub fn escape_term(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if RESERVED.contains(&c) || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Double-quoted phrase; only `"` and `\` need escaping inside quotes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Regex literal body for `/.../`.
pub fn regex(s: &str) -> String {
    format!("/{}/", s.replace('/', "\\/"))
}

/// Render a Sigma string as a term: quoted when it has no wildcards,
/// otherwise escaped literal runs with Lucene `*`/`?`.
pub fn sigma_string(value: &SigmaString) -> String {
    if !value.has_wildcards() {
        let literal: String = value
            .pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Literal(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        return quote(&literal);
    }
    wildcard(&value.pieces)
}

pub fn wildcard(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|p| match p {
            Piece::Literal(s) => escape_term(s),
            Piece::AnyChars => "*".to_string(),
            Piece::OneChar => "?".to_string(),
        })
        .collect()
}
