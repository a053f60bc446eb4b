/// Shared test helpers for database tests
use super::Database;
use crate::model::{CaseReference, CaseStatus, Curator, Day0Case, Demographics, Events, Location};
use chrono::{TimeZone, Utc};

/// Fresh in-memory database with migrations applied
pub async fn setup_test_db() -> Database {
    Database::in_memory()
        .await
        .expect("Failed to create in-memory test database")
}

/// Minimal valid case; tweak fields per test.
pub fn sample_case(country: &str, iso3: &str) -> Day0Case {
    Day0Case {
        id: None,
        case_status: CaseStatus::Confirmed,
        pathogen: "COVID-19".to_string(),
        case_reference: CaseReference {
            source_id: "5ea86423bae6982635d2e1f8".to_string(),
            source_entry_id: None,
            source_url: "https://example.com/source".to_string(),
            is_government_source: false,
            upload_ids: Vec::new(),
        },
        demographics: None,
        location: Location {
            country: country.to_string(),
            country_iso3: iso3.to_string(),
            location: None,
            place: None,
            query: None,
            geometry: None,
        },
        events: Events {
            date_entry: Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap(),
            date_last_modified: None,
            date_onset: None,
            date_confirmation: None,
            confirmation_method: None,
            hospitalized: None,
            date_hospitalization: None,
            intensive_care: None,
            outcome: None,
            date_death: None,
            date_recovered: None,
        },
        symptoms: None,
        preexisting_condition: None,
        transmission: None,
        notes: None,
        curators: None,
        revision_metadata: None,
        curator: Some(test_curator()),
    }
}

pub fn with_demographics(mut case: Day0Case, demographics: Demographics) -> Day0Case {
    case.demographics = Some(demographics);
    case
}

pub fn test_curator() -> Curator {
    Curator {
        email: "curator@example.com".to_string(),
        name: Some("Test Curator".to_string()),
    }
}
