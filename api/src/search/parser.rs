use super::keywords::{date_operator, find_keyword, KeywordKind, KEYWORDS};
use super::types::{Filter, FilterValue, ParsedSearch, ParsingError};
use crate::model::dates::parse_flexible;
use crate::model::CaseId;
use regex::Regex;
use std::sync::OnceLock;

static SPACE_AFTER_COLON: OnceLock<Regex> = OnceLock::new();

fn space_after_colon() -> &'static Regex {
    SPACE_AFTER_COLON.get_or_init(|| Regex::new(r"((?-u:\w):)\s+").unwrap())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Index into KEYWORDS plus the unquoted value, possibly empty.
    Keyword(usize, String),
    Text(String),
}

struct Tokenizer {
    input: Vec<char>,
    pos: usize,
}

impl Tokenizer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Consumes a quoted section starting at the opening quote, keeping it verbatim.
    fn read_quoted(&mut self, term: &mut String) {
        let Some(quote) = self.advance() else {
            return;
        };
        term.push(quote);
        while let Some(ch) = self.advance() {
            term.push(ch);
            if ch == '\\' {
                if let Some(escaped) = self.advance() {
                    term.push(escaped);
                }
            } else if ch == quote {
                break;
            }
        }
    }

    /// Reads one whitespace-delimited term. Quotes open a section only at the
    /// start of a term, after a leading `-`, or directly after a `:`.
    fn read_term(&mut self) -> String {
        let mut term = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                break;
            }
            let at_quote_start = term.is_empty() || term == "-" || term.ends_with(':');
            if (ch == '"' || ch == '\'') && at_quote_start {
                self.read_quoted(&mut term);
            } else {
                term.push(ch);
                self.advance();
            }
        }
        term
    }
}

/// Splits free text into terms with the same quoting rules as the parser.
pub(super) fn split_terms(text: &str) -> Vec<String> {
    let mut tokenizer = Tokenizer::new(text);
    let mut terms = Vec::new();
    loop {
        tokenizer.skip_whitespace();
        if tokenizer.peek().is_none() {
            break;
        }
        terms.push(tokenizer.read_term());
    }
    terms
}

fn classify(term: String) -> Token {
    if let Some((prefix, value)) = term.split_once(':') {
        if let Some(idx) = find_keyword(prefix) {
            return Token::Keyword(idx, unquote(value));
        }
    }
    Token::Text(term)
}

/// Strips matching surrounding quotes and resolves backslash escapes.
pub(super) fn unquote(value: &str) -> String {
    let mut chars = value.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return value.to_string(),
    };
    let mut result = String::new();
    let mut closed = false;
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    result.push(escaped);
                }
            }
            _ if ch == quote => {
                closed = true;
                break;
            }
            _ => result.push(ch),
        }
    }
    if closed && chars.next().is_none() {
        result
    } else {
        value.to_string()
    }
}

struct Parser {
    query: String,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(query: String, tokens: Vec<Token>) -> Self {
        Self {
            query,
            tokens,
            pos: 0,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse(&mut self) -> Result<ParsedSearch, ParsingError> {
        let mut keyword_values: Vec<Vec<String>> = vec![Vec::new(); KEYWORDS.len()];
        let mut text_terms = Vec::new();
        let mut keyword_seen = false;

        while let Some(token) = self.advance() {
            match token {
                Token::Keyword(idx, value) => {
                    keyword_seen = true;
                    // `country:` carries nothing
                    if !value.is_empty() {
                        keyword_values[idx].push(value);
                    }
                }
                Token::Text(term) => text_terms.push(term),
            }
        }

        if !keyword_seen {
            return self.finish(ParsedSearch {
                full_text_search: Some(self.query.clone()),
                filters: Vec::new(),
            });
        }

        let mut filters = Vec::new();
        for (keyword, values) in KEYWORDS.iter().zip(keyword_values) {
            if values.is_empty() {
                continue;
            }
            let values = values
                .into_iter()
                .map(|value| self.convert_value(keyword.name, keyword.kind, value))
                .collect::<Result<Vec<_>, _>>()?;
            filters.push(Filter::new(keyword.path, values, date_operator(keyword.name)));
        }

        let full_text_search = if text_terms.is_empty() {
            None
        } else {
            Some(text_terms.join(" "))
        };

        self.finish(ParsedSearch {
            full_text_search,
            filters,
        })
    }

    fn convert_value(
        &self,
        keyword: &str,
        kind: KeywordKind,
        value: String,
    ) -> Result<FilterValue, ParsingError> {
        // every id must parse, `*` included
        if value == "*" && kind != KeywordKind::CaseId {
            return Ok(FilterValue::Wildcard);
        }
        match kind {
            KeywordKind::Text => Ok(FilterValue::Text(value)),
            KeywordKind::CaseId => value
                .parse::<CaseId>()
                .map(FilterValue::CaseId)
                .map_err(|_| ParsingError::InvalidCaseId {
                    query: self.query.clone(),
                    value,
                }),
            KeywordKind::Date => match parse_flexible(&value) {
                Some(date) => Ok(FilterValue::Date(date)),
                None => Err(ParsingError::InvalidDate {
                    query: self.query.clone(),
                    keyword: keyword.to_string(),
                    value,
                }),
            },
        }
    }

    fn finish(&self, parsed: ParsedSearch) -> Result<ParsedSearch, ParsingError> {
        let has_text = parsed
            .full_text_search
            .as_deref()
            .is_some_and(|text| !text.is_empty());
        if parsed.filters.is_empty() && !has_text {
            return Err(ParsingError::InvalidQuery {
                query: self.query.clone(),
            });
        }
        Ok(parsed)
    }
}

/// Parses a case search query such as `country:DEU gender:female cough`.
///
/// Recognized `keyword:value` tokens become filters, everything else is kept
/// as the full-text remainder. Repeated keywords are merged into one filter.
pub fn parse_search_query(raw: &str) -> Result<ParsedSearch, ParsingError> {
    let query = space_after_colon()
        .replace_all(raw.trim(), "$1")
        .into_owned();
    let tokens = split_terms(&query).into_iter().map(classify).collect();
    Parser::new(query, tokens).parse()
}
