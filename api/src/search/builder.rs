use super::compiler::{CaseQuery, Collation, FetchWindow, Predicate, SortOrder, ID_PATH};
use super::text::to_fts_expression;
use super::types::FilterValue;
use crate::model::dates::format_stored;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    String(String),
    Integer(i64),
}

/// Rendered statement plus its bind values in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// SQL expression reading `path` from a stored case.
/// Paths come from fixed tables, never from user input.
fn field_expr(path: &str) -> String {
    if path == ID_PATH {
        "id".to_string()
    } else {
        format!("json_extract(document, '$.{}')", path)
    }
}

fn json_type_expr(path: &str) -> String {
    format!("json_type(document, '$.{}')", path)
}

fn collate(collation: Collation) -> &'static str {
    match collation {
        Collation::CaseInsensitive => " COLLATE CASEFOLD",
        Collation::Binary => "",
    }
}

fn exists_clause(path: &str) -> String {
    if path == ID_PATH {
        "id IS NOT NULL".to_string()
    } else {
        format!("{} IS NOT NULL", json_type_expr(path))
    }
}

fn missing_clause(path: &str) -> String {
    if path == ID_PATH {
        "id IS NULL".to_string()
    } else {
        format!("{} IS NULL", json_type_expr(path))
    }
}

fn to_sql_value(value: &FilterValue) -> SqlValue {
    match value {
        FilterValue::Text(s) => SqlValue::String(s.clone()),
        FilterValue::CaseId(id) => SqlValue::String(id.to_hex()),
        FilterValue::Date(date) => SqlValue::String(format_stored(date)),
        FilterValue::Wildcard => SqlValue::String("*".to_string()),
    }
}

/// Text comparisons honor the query collation; ids and dates compare bytewise.
fn value_collation(value: &FilterValue, collation: Collation) -> Collation {
    match value {
        FilterValue::Text(_) => collation,
        _ => Collation::Binary,
    }
}

fn next_placeholder(idx: &mut usize) -> String {
    *idx += 1;
    format!("${}", *idx)
}

fn build_predicate_sql(
    predicate: &Predicate,
    collation: Collation,
    idx: &mut usize,
    values: &mut Vec<SqlValue>,
) -> String {
    match predicate {
        Predicate::Exists { path } => exists_clause(path),
        Predicate::Missing { path } => missing_clause(path),
        Predicate::Equals { path, value } => {
            let placeholder = next_placeholder(idx);
            values.push(to_sql_value(value));
            format!(
                "{} = {}{}",
                field_expr(path),
                placeholder,
                collate(value_collation(value, collation))
            )
        }
        Predicate::Compare {
            path,
            operator,
            value,
        } => {
            let placeholder = next_placeholder(idx);
            values.push(to_sql_value(value));
            format!("{} {} {}", field_expr(path), operator.as_sql(), placeholder)
        }
        Predicate::In {
            path,
            values: members,
        } => {
            // `*` is only special on its own; inside a set it is a literal
            let member_collation = if members.iter().any(|v| matches!(v, FilterValue::Text(_))) {
                collation
            } else {
                Collation::Binary
            };
            let placeholders: Vec<String> = members
                .iter()
                .map(|member| {
                    values.push(to_sql_value(member));
                    next_placeholder(idx)
                })
                .collect();
            format!(
                "{}{} IN ({})",
                field_expr(path),
                collate(member_collation),
                placeholders.join(", ")
            )
        }
        Predicate::FullText { text } => match to_fts_expression(text) {
            Some(expression) => {
                let placeholder = next_placeholder(idx);
                values.push(SqlValue::String(expression));
                format!(
                    "seq IN (SELECT rowid FROM cases_fts WHERE cases_fts MATCH {})",
                    placeholder
                )
            }
            None => "0".to_string(),
        },
    }
}

/// Builds the WHERE clause shared by every statement over `query`.
/// Uses numbered placeholders starting after `start_offset`.
pub fn build_where_with_offset(query: &CaseQuery, start_offset: usize) -> (String, Vec<SqlValue>) {
    if query.predicates.is_empty() {
        return ("1".to_string(), Vec::new());
    }

    let mut sql_parts = Vec::new();
    let mut bind_values = Vec::new();
    let mut placeholder_idx = start_offset;

    for predicate in &query.predicates {
        let sql = build_predicate_sql(
            predicate,
            query.collation,
            &mut placeholder_idx,
            &mut bind_values,
        );
        sql_parts.push(sql);
    }

    (sql_parts.join(" AND "), bind_values)
}

pub fn build_where(query: &CaseQuery) -> (String, Vec<SqlValue>) {
    build_where_with_offset(query, 0)
}

/// `SELECT id, document` for one window of matching cases.
pub fn build_fetch_sql(query: &CaseQuery, window: &FetchWindow) -> SqlStatement {
    let (where_sql, mut values) = build_where(query);
    let direction = match window.order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let limit_idx = values.len() + 1;
    let offset_idx = values.len() + 2;
    let sql = format!(
        "SELECT id, document FROM cases WHERE {} ORDER BY {}{} {}, seq {} LIMIT ${} OFFSET ${}",
        where_sql,
        field_expr(window.sort_by.path()),
        collate(query.collation),
        direction,
        direction,
        limit_idx,
        offset_idx
    );
    // negative LIMIT means no limit in SQLite
    values.push(SqlValue::Integer(window.limit.unwrap_or(-1)));
    values.push(SqlValue::Integer(window.offset.max(0)));
    SqlStatement { sql, values }
}

/// Counts matching cases, stopping at `cap` when given.
pub fn build_count_sql(query: &CaseQuery, cap: Option<i64>) -> SqlStatement {
    let (where_sql, mut values) = build_where(query);
    let sql = match cap {
        Some(cap) => {
            let cap_idx = values.len() + 1;
            values.push(SqlValue::Integer(cap));
            format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM cases WHERE {} LIMIT ${})",
                where_sql, cap_idx
            )
        }
        None => format!("SELECT COUNT(*) FROM cases WHERE {}", where_sql),
    };
    SqlStatement { sql, values }
}

pub fn build_delete_sql(query: &CaseQuery) -> SqlStatement {
    let (where_sql, values) = build_where(query);
    SqlStatement {
        sql: format!("DELETE FROM cases WHERE {}", where_sql),
        values,
    }
}

/// Copies every matching case into `case_revisions`, keeping the first
/// snapshot of a given revision.
pub fn build_snapshot_sql(query: &CaseQuery) -> SqlStatement {
    let (where_sql, values) = build_where(query);
    SqlStatement {
        sql: format!(
            "INSERT OR IGNORE INTO case_revisions (case_id, revision_number, document) \
             SELECT id, COALESCE(json_extract(document, '$.revisionMetadata.revisionNumber'), 0), document \
             FROM cases WHERE {}",
            where_sql
        ),
        values,
    }
}

/// Next batch after `after_seq`, in insertion order, for exports.
pub fn build_export_batch_sql(query: &CaseQuery, after_seq: i64, batch_size: i64) -> SqlStatement {
    let (where_sql, mut values) = build_where(query);
    let seq_idx = values.len() + 1;
    let limit_idx = values.len() + 2;
    values.push(SqlValue::Integer(after_seq));
    values.push(SqlValue::Integer(batch_size));
    SqlStatement {
        sql: format!(
            "SELECT seq, id, document FROM cases WHERE ({}) AND seq > ${} ORDER BY seq LIMIT ${}",
            where_sql, seq_idx, limit_idx
        ),
        values,
    }
}
