/// Default database URL for local development
pub const DEFAULT_DATABASE_URL: &str = "sqlite:./cases.db?mode=rwc";

pub mod cases;
pub mod collation;
pub mod core;
pub mod types;

pub use types::{BatchUpsertSummary, CaseRow, CountryData, Database, UpsertOutcome};

#[cfg(test)]
pub mod test_helpers;
