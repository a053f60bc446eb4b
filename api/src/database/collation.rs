//! `CASEFOLD` collation: compares strings ignoring case and accents.
//!
//! Registered on every pooled connection so equality, `IN` and `ORDER BY`
//! clauses can use `COLLATE CASEFOLD`.

use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const CASEFOLD: &str = "CASEFOLD";

/// Decomposes, drops combining marks and lowercases.
pub fn fold(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn casefold_compare(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        return a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()));
    }
    fold(a).cmp(&fold(b))
}
