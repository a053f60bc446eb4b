use super::dates::stored;
use chrono::{DateTime, Utc};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "snake_case")]
#[oai(rename_all = "snake_case")]
pub enum CaseStatus {
    Confirmed,
    Suspected,
    Discarded,
    OmitError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
#[oai(rename_all = "lowercase")]
pub enum Outcome {
    Recovered,
    Death,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[oai(rename_all = "UPPERCASE")]
pub enum YesNo {
    Y,
    N,
    NA,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Curator {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct CaseReference {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entry_id: Option<String>,
    pub source_url: String,
    #[serde(default)]
    #[oai(default)]
    pub is_government_source: bool,
    #[serde(default)]
    #[oai(default)]
    pub upload_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
pub struct AgeRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Demographics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcare_worker: Option<YesNo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
pub struct Geometry {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Location {
    pub country: String,
    #[serde(rename = "countryISO3")]
    #[oai(rename = "countryISO3")]
    pub country_iso3: String,
    /// Precise location, such as an establishment or point of interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Events {
    #[serde(with = "stored")]
    pub date_entry: DateTime<Utc>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_last_modified: Option<DateTime<Utc>>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_onset: Option<DateTime<Utc>>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_confirmation: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospitalized: Option<YesNo>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_hospitalization: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensive_care: Option<YesNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_death: Option<DateTime<Utc>>,
    #[serde(default, with = "stored::option", skip_serializing_if = "Option::is_none")]
    pub date_recovered: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Curators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Curator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<Curator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct EditMetadata {
    pub curator: String,
    #[serde(with = "stored")]
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct RevisionMetadata {
    pub revision_number: i64,
    pub creation_metadata: EditMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_metadata: Option<EditMetadata>,
}

/// A single case record.
///
/// The same shape is used on the wire and in the store. `_id` lives in its
/// own column and `curator` only identifies who is acting on a request, so
/// neither is written into the stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Object)]
#[serde(rename_all = "camelCase")]
#[oai(rename_all = "camelCase", skip_serializing_if_is_none)]
pub struct Day0Case {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    #[oai(rename = "_id")]
    pub id: Option<String>,
    pub case_status: CaseStatus,
    pub pathogen: String,
    pub case_reference: CaseReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
    pub location: Location,
    pub events: Events,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preexisting_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curators: Option<Curators>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_metadata: Option<RevisionMetadata>,
    #[serde(default, skip_serializing)]
    pub curator: Option<Curator>,
}

impl Day0Case {
    /// JSON document as written to the store.
    pub fn to_document(&self) -> serde_json::Result<serde_json::Value> {
        let mut stored = self.clone();
        stored.id = None;
        stored.curator = None;
        serde_json::to_value(&stored)
    }

    pub fn from_document(id: &str, document: &str) -> serde_json::Result<Self> {
        let mut case: Day0Case = serde_json::from_str(document)?;
        case.id = Some(id.to_string());
        Ok(case)
    }

    pub fn curator_email(&self) -> Option<&str> {
        self.curator.as_ref().map(|c| c.email.as_str())
    }

    /// Revision 0, created and last updated by `curator` at `now`.
    pub fn set_created(&mut self, curator: &str, now: DateTime<Utc>) {
        self.revision_metadata = Some(RevisionMetadata {
            revision_number: 0,
            creation_metadata: EditMetadata {
                curator: curator.to_string(),
                date: now,
                notes: None,
            },
            update_metadata: Some(EditMetadata {
                curator: curator.to_string(),
                date: now,
                notes: Some("Creation".to_string()),
            }),
        });
        let created_by = Curator {
            email: curator.to_string(),
            name: self.curator.as_ref().and_then(|c| c.name.clone()),
        };
        self.curators.get_or_insert_with(Curators::default).created_by = Some(created_by);
    }

    /// Carries creation metadata over from `previous` and records a new
    /// revision by `curator`.
    pub fn set_updated(
        &mut self,
        previous: &Day0Case,
        curator: &str,
        note: &str,
        now: DateTime<Utc>,
    ) {
        let (revision_number, creation_metadata) = match &previous.revision_metadata {
            Some(meta) => (meta.revision_number + 1, meta.creation_metadata.clone()),
            None => (
                1,
                EditMetadata {
                    curator: curator.to_string(),
                    date: now,
                    notes: None,
                },
            ),
        };
        self.revision_metadata = Some(RevisionMetadata {
            revision_number,
            creation_metadata,
            update_metadata: Some(EditMetadata {
                curator: curator.to_string(),
                date: now,
                notes: Some(note.to_string()),
            }),
        });
        if self.curators.is_none() {
            self.curators = previous.curators.clone();
        }
    }

    /// Equal apart from identity and curation bookkeeping.
    pub fn same_content(&self, other: &Day0Case) -> bool {
        fn content(case: &Day0Case) -> Day0Case {
            let mut case = case.clone();
            case.id = None;
            case.curator = None;
            case.curators = None;
            case.revision_metadata = None;
            case
        }
        content(self) == content(other)
    }

    pub fn strip_source_entry_id(&mut self) {
        self.case_reference.source_entry_id = None;
    }

    /// Text indexed for full-text search.
    pub fn search_text(&self) -> String {
        let demographics = self.demographics.as_ref();
        let parts = [
            Some(self.pathogen.as_str()),
            Some(self.location.country.as_str()),
            self.location.place.as_deref(),
            self.location.location.as_deref(),
            demographics.and_then(|d| d.occupation.as_deref()),
            self.symptoms.as_deref(),
            self.preexisting_condition.as_deref(),
            self.transmission.as_deref(),
            self.notes.as_deref(),
        ];
        parts
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
