mod builder;
mod compiler;
mod keywords;
mod parser;
mod text;
mod types;

pub use builder::{
    build_count_sql, build_delete_sql, build_export_batch_sql, build_fetch_sql,
    build_snapshot_sql, build_where, SqlStatement, SqlValue,
};
pub use compiler::{
    CaseQuery, Collation, FetchWindow, Predicate, QueryCompiler, SortBy, SortOrder,
};
pub use keywords::KEYWORDS;
pub use parser::parse_search_query;
pub use text::to_fts_expression;
pub use types::{DateOperator, Filter, FilterValue, ParsedSearch, ParsingError};
