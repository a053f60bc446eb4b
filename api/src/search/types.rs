/// Parsed representation of a case search query
use crate::model::CaseId;
use chrono::{DateTime, Utc};
use poem::http::StatusCode;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateOperator {
    GreaterOrEqual, // dateXxxFrom
    LessThan,       // dateXxxTo
}

impl DateOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            DateOperator::GreaterOrEqual => ">=",
            DateOperator::LessThan => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FilterValue {
    Text(String),
    CaseId(CaseId),
    Date(#[serde(with = "crate::model::dates::stored")] DateTime<Utc>),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub path: &'static str,
    pub values: Vec<FilterValue>, // OR-ed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_operator: Option<DateOperator>,
}

impl Filter {
    pub fn new(
        path: &'static str,
        values: Vec<FilterValue>,
        date_operator: Option<DateOperator>,
    ) -> Self {
        Self {
            path,
            values,
            date_operator,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSearch {
    /// Part of the query not consumed by keywords. `Some("")` and `None` differ.
    pub full_text_search: Option<String>,
    pub filters: Vec<Filter>,
}

impl ParsedSearch {
    /// Remainder that should turn into a full-text predicate, if any.
    pub fn full_text(&self) -> Option<&str> {
        self.full_text_search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Client error raised while parsing a search query.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsingError {
    InvalidQuery { query: String },
    InvalidCaseId { query: String, value: String },
    InvalidDate { query: String, keyword: String, value: String },
}

impl ParsingError {
    pub fn query(&self) -> &str {
        match self {
            ParsingError::InvalidQuery { query }
            | ParsingError::InvalidCaseId { query, .. }
            | ParsingError::InvalidDate { query, .. } => query,
        }
    }
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid search query {}", self.query())?;
        match self {
            ParsingError::InvalidQuery { .. } => Ok(()),
            ParsingError::InvalidCaseId { value, .. } => {
                write!(f, ": invalid case id {}", value)
            }
            ParsingError::InvalidDate { keyword, value, .. } => {
                write!(f, ": invalid date {} for {}", value, keyword)
            }
        }
    }
}

impl std::error::Error for ParsingError {}

impl poem::error::ResponseError for ParsingError {
    fn status(&self) -> StatusCode {
        StatusCode::UNPROCESSABLE_ENTITY
    }
}
