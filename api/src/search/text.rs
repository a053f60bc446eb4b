use super::parser::{split_terms, unquote};

/// Translates a full-text remainder into an FTS5 MATCH expression.
///
/// Bare terms are OR-ed together. Quoted phrases are all required and, when
/// present, replace the bare terms. A `-term` excludes matching records.
/// Returns `None` when nothing positive is left to match.
pub fn to_fts_expression(text: &str) -> Option<String> {
    let mut words = Vec::new();
    let mut phrases = Vec::new();
    let mut excluded = Vec::new();

    for term in split_terms(text) {
        if let Some(negated) = term.strip_prefix('-').filter(|t| !t.is_empty()) {
            push_term(&mut excluded, &unquote(negated));
        } else if term.starts_with('"') || term.starts_with('\'') {
            push_term(&mut phrases, &unquote(&term));
        } else {
            push_term(&mut words, &term);
        }
    }

    let positive = if !phrases.is_empty() {
        phrases.join(" AND ")
    } else if !words.is_empty() {
        words.join(" OR ")
    } else {
        return None;
    };

    if excluded.is_empty() {
        return Some(positive);
    }
    let mut expression = format!("({})", positive);
    for term in excluded {
        expression.push_str(" NOT ");
        expression.push_str(&term);
    }
    Some(expression)
}

fn push_term(terms: &mut Vec<String>, term: &str) {
    if term.trim().is_empty() {
        return;
    }
    terms.push(quote_fts(term));
}

/// FTS5 string literal; embedded double quotes are doubled.
fn quote_fts(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}
