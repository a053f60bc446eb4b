use super::types::{DateOperator, FilterValue, ParsedSearch};
use crate::model::CaseId;
use serde::Serialize;

const GENDER_PATH: &str = "demographics.gender";
const NOT_PROVIDED: &str = "notProvided";
pub const VERIFIED_BY_PATH: &str = "curators.verifiedBy";
pub const ID_PATH: &str = "_id";

/// String comparison rule applied to equality and set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Collation {
    /// Ignores case and accents (`CASEFOLD` collation).
    #[default]
    CaseInsensitive,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Predicate {
    Exists { path: &'static str },
    Missing { path: &'static str },
    Equals { path: &'static str, value: FilterValue },
    Compare { path: &'static str, operator: DateOperator, value: FilterValue },
    In { path: &'static str, values: Vec<FilterValue> },
    FullText { text: String },
}

/// Predicates shared by the fetch and count statements of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseQuery {
    pub predicates: Vec<Predicate>,
    pub collation: Collation,
}

impl CaseQuery {
    /// Matches every case.
    pub fn all(collation: Collation) -> Self {
        Self {
            predicates: Vec::new(),
            collation,
        }
    }

    pub fn by_ids(ids: &[CaseId], collation: Collation) -> Self {
        let values = ids.iter().copied().map(FilterValue::CaseId).collect();
        Self {
            predicates: vec![Predicate::In {
                path: ID_PATH,
                values,
            }],
            collation,
        }
    }

    /// `Some(true)` keeps verified cases only, `Some(false)` unverified only.
    pub fn with_verification_status(mut self, verified: Option<bool>) -> Self {
        match verified {
            Some(true) => self.predicates.push(Predicate::Exists {
                path: VERIFIED_BY_PATH,
            }),
            Some(false) => self.predicates.push(Predicate::Missing {
                path: VERIFIED_BY_PATH,
            }),
            None => {}
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryCompiler {
    collation: Collation,
}

impl QueryCompiler {
    pub fn new(collation: Collation) -> Self {
        Self { collation }
    }

    pub fn collation(&self) -> Collation {
        self.collation
    }

    pub fn compile(&self, parsed: &ParsedSearch) -> CaseQuery {
        let mut predicates: Vec<Predicate> = parsed
            .filters
            .iter()
            .map(|filter| match filter.values.as_slice() {
                [FilterValue::Wildcard] => Predicate::Exists { path: filter.path },
                [value] => match filter.date_operator {
                    Some(operator) => Predicate::Compare {
                        path: filter.path,
                        operator,
                        value: value.clone(),
                    },
                    None if is_not_provided(filter.path, value) => {
                        Predicate::Missing { path: filter.path }
                    }
                    None => Predicate::Equals {
                        path: filter.path,
                        value: value.clone(),
                    },
                },
                values => Predicate::In {
                    path: filter.path,
                    values: values.to_vec(),
                },
            })
            .collect();

        if let Some(text) = parsed.full_text() {
            predicates.push(Predicate::FullText {
                text: text.to_string(),
            });
        }

        CaseQuery {
            predicates,
            collation: self.collation,
        }
    }
}

fn is_not_provided(path: &str, value: &FilterValue) -> bool {
    path == GENDER_PATH && matches!(value, FilterValue::Text(v) if v == NOT_PROVIDED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Default,
    ConfirmationDate,
    Country,
    Location,
    Age,
    Occupation,
    Outcome,
    Identifier,
}

impl SortBy {
    pub fn path(&self) -> &'static str {
        match self {
            SortBy::Default | SortBy::ConfirmationDate => "events.dateConfirmation",
            SortBy::Country => "location.countryISO3",
            SortBy::Location => "location.location",
            SortBy::Age => "demographics.ageRange.start",
            SortBy::Occupation => "demographics.occupation",
            SortBy::Outcome => "events.outcome",
            SortBy::Identifier => ID_PATH,
        }
    }
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(SortBy::Default),
            "confirmationDate" => Ok(SortBy::ConfirmationDate),
            "country" => Ok(SortBy::Country),
            "location" => Ok(SortBy::Location),
            "age" => Ok(SortBy::Age),
            "occupation" => Ok(SortBy::Occupation),
            "outcome" => Ok(SortBy::Outcome),
            "_id" => Ok(SortBy::Identifier),
            other => Err(format!("Unknown sort_by value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" | "asc" => Ok(SortOrder::Ascending),
            "descending" | "desc" => Ok(SortOrder::Descending),
            other => Err(format!("Unknown order value: {}", other)),
        }
    }
}

/// Sort plus the slice of results to return. `limit: None` returns everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchWindow {
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub offset: i64,
    pub limit: Option<i64>,
}

impl FetchWindow {
    /// 1-based page of `limit` records.
    pub fn page(page: i64, limit: i64) -> Self {
        Self {
            offset: (page - 1).saturating_mul(limit),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, sort_by: SortBy, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }
}
