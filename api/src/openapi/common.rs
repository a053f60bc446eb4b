use crate::model::{Curator, Day0Case};
use poem_openapi::{payload::Json, Object, Tags};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Object)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize, Object)]
#[oai(skip_serializing_if_is_none)]
pub struct ApiResponse<T: poem_openapi::types::ParseFromJSON + poem_openapi::types::ToJSON> {
    pub success: bool,
    #[oai(skip_serializing_if_is_none)]
    pub data: Option<T>,
    #[oai(skip_serializing_if_is_none)]
    pub error: Option<String>,
}

impl<T: poem_openapi::types::ParseFromJSON + poem_openapi::types::ToJSON> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Error envelope with no payload
pub fn error_body(message: impl Into<String>) -> Json<ApiResponse<String>> {
    Json(ApiResponse {
        success: false,
        data: None,
        error: Some(message.into()),
    })
}

pub fn default_page() -> i64 {
    1
}

pub fn default_limit() -> i64 {
    10
}

pub fn default_false() -> bool {
    false
}

// Request and response types for cases

#[derive(Debug, Serialize, Object)]
#[oai(rename_all = "camelCase")]
pub struct ListCasesResponse {
    pub cases: Vec<Day0Case>,
    #[oai(skip_serializing_if_is_none)]
    pub next_page: Option<i64>,
    pub total: i64,
}

#[derive(Debug, Serialize, Object)]
pub struct CreatedCases {
    pub cases: Vec<Day0Case>,
}

#[derive(Debug, Deserialize, Object)]
#[oai(rename_all = "camelCase")]
pub struct CaseSelection {
    pub query: Option<String>,
    pub case_ids: Option<Vec<String>>,
    /// Refuse a query delete that would remove more cases than this
    pub max_cases_threshold: Option<i64>,
}

#[derive(Debug, Deserialize, Object)]
pub struct BatchUpsertRequest {
    pub cases: Vec<Day0Case>,
    pub curator: Option<Curator>,
}

#[derive(Debug, Clone, Serialize, Object)]
pub struct CaseValidationError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Object)]
#[oai(rename_all = "camelCase")]
pub struct BatchUpsertResult {
    pub num_created: usize,
    pub num_updated: usize,
    pub num_unchanged: usize,
    pub errors: Vec<CaseValidationError>,
}

/// Full replacements for existing cases, each carrying its `_id`
#[derive(Debug, Deserialize, Object)]
pub struct BatchUpdateRequest {
    pub cases: Vec<Day0Case>,
    pub curator: Option<Curator>,
}

#[derive(Debug, Deserialize, Object)]
pub struct BatchUpdateQueryRequest {
    pub query: String,
    /// JSON merge patch applied to every matching case
    pub case: serde_json::Value,
    pub curator: Curator,
}

#[derive(Debug, Serialize, Object)]
#[oai(rename_all = "camelCase")]
pub struct BatchUpdateResult {
    pub num_modified: u64,
}

#[derive(Debug, Deserialize, Object)]
#[oai(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub query: Option<String>,
    pub case_ids: Option<Vec<String>>,
    /// `csv` (default), `tsv` or `json`
    pub format: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Object)]
pub struct CaseRevisions {
    pub revisions: Vec<Day0Case>,
}

#[derive(Debug, Serialize, Object)]
pub struct OccupationList {
    pub occupations: Vec<String>,
}

#[derive(Debug, Deserialize, Object)]
pub struct VerifyCaseRequest {
    pub curator: Curator,
}

#[derive(Tags)]
pub enum ApiTags {
    /// System endpoints
    System,
    /// Case record endpoints
    Cases,
}
