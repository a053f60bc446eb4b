use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CaseRow {
    pub id: String,
    pub document: String,
}

/// Result of upserting one case on (sourceId, sourceEntryId).
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(crate::model::Day0Case),
    Updated(crate::model::Day0Case),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpsertSummary {
    pub num_created: usize,
    pub num_updated: usize,
    /// Cases identical to the stored version, left untouched
    pub num_unchanged: usize,
}

/// Counts keyed by case status and outcome, plus `total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, poem_openapi::Object)]
pub struct CountryData {
    pub countries: BTreeMap<String, BTreeMap<String, i64>>,
    pub globally: BTreeMap<String, i64>,
}
