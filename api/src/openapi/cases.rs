use super::common::{
    default_false, default_limit, default_page, error_body, ApiResponse, ApiTags,
    BatchUpdateQueryRequest, BatchUpdateRequest, BatchUpdateResult, BatchUpsertRequest,
    BatchUpsertResult, CaseRevisions, CaseSelection, CaseValidationError, CreatedCases,
    DownloadRequest, ListCasesResponse, OccupationList, VerifyCaseRequest,
};
use crate::config::AppConfig;
use crate::database::{CountryData, Database, UpsertOutcome};
use crate::export::{export_filename, parse_format, CaseExporter};
use crate::model::{CaseId, Day0Case};
use crate::search::{
    parse_search_query, CaseQuery, Collation, FetchWindow, ParsingError, QueryCompiler, SortBy,
    SortOrder,
};
use crate::validation::validate_case;
use poem::http::StatusCode;
use poem::web::Data;
use poem_openapi::{
    param::{Path, Query},
    payload::{Binary, Json, Response},
    OpenApi,
};
use std::sync::Arc;

#[derive(poem_openapi::ApiResponse)]
pub enum ListResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<ListCasesResponse>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum CaseResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<Day0Case>>),
    #[oai(status = 201)]
    Created(Json<ApiResponse<Day0Case>>),
    #[oai(status = 404)]
    NotFound(Json<ApiResponse<String>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum CreateResponse {
    #[oai(status = 201)]
    Created(Json<ApiResponse<CreatedCases>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum DeleteResponse {
    #[oai(status = 204)]
    NoContent,
    #[oai(status = 400)]
    BadRequest(Json<ApiResponse<String>>),
    #[oai(status = 404)]
    NotFound(Json<ApiResponse<String>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum BatchUpsertResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<BatchUpsertResult>>),
    /// Some cases failed validation and were skipped
    #[oai(status = 207)]
    MultiStatus(Json<ApiResponse<BatchUpsertResult>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum BatchUpdateResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<BatchUpdateResult>>),
    #[oai(status = 400)]
    BadRequest(Json<ApiResponse<String>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum RevisionsResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<CaseRevisions>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum OccupationsResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<OccupationList>>),
    #[oai(status = 422)]
    Unprocessable(Json<ApiResponse<String>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

#[derive(poem_openapi::ApiResponse)]
pub enum CountryDataResponse {
    #[oai(status = 200)]
    Ok(Json<ApiResponse<CountryData>>),
    #[oai(status = 500)]
    InternalError(Json<ApiResponse<String>>),
}

/// Parses and compiles a search query with the default collation.
fn compile_search(query: &str) -> Result<CaseQuery, ParsingError> {
    let parsed = parse_search_query(query)?;
    Ok(QueryCompiler::new(Collation::default()).compile(&parsed))
}

/// Blank or absent queries select every case without going through the parser.
fn compile_optional_search(query: Option<&str>) -> Result<CaseQuery, ParsingError> {
    match query {
        Some(q) if !q.trim().is_empty() => compile_search(q),
        _ => Ok(CaseQuery::all(Collation::default())),
    }
}

fn parse_case_ids(raw: &[String]) -> Result<Vec<CaseId>, String> {
    raw.iter()
        .map(|id| {
            id.parse::<CaseId>()
                .map_err(|e| format!("Invalid case id {}: {}", id, e))
        })
        .collect()
}

fn require_curator(case: &Day0Case) -> Result<String, String> {
    case.curator_email()
        .map(str::to_string)
        .ok_or_else(|| "curator email is required".to_string())
}

/// Checks the body and returns the acting curator's email.
fn check_case_body(case: &Day0Case) -> Result<String, String> {
    validate_case(case).map_err(|e| e.to_string())?;
    require_curator(case)
}

fn not_found(id: &str) -> Json<ApiResponse<String>> {
    error_body(format!("Day0Case with ID {} not found.", id))
}

fn internal_error(context: &str, e: anyhow::Error) -> Json<ApiResponse<String>> {
    tracing::error!("{}: {:#}", context, e);
    error_body(format!("{}: {}", context, e))
}

fn for_response(mut case: Day0Case) -> Day0Case {
    case.strip_source_entry_id();
    case
}

pub struct CasesApi;

#[OpenApi]
impl CasesApi {
    /// List cases
    ///
    /// Pages through cases matching the search query `q`. `total` never exceeds `count_limit`.
    #[oai(path = "/cases", method = "get", tag = "ApiTags::Cases")]
    #[allow(clippy::too_many_arguments)]
    async fn list_cases(
        &self,
        db: Data<&Arc<Database>>,
        config: Data<&Arc<AppConfig>>,
        q: Query<Option<String>>,
        #[oai(default = "default_page")] page: Query<i64>,
        #[oai(default = "default_limit")] limit: Query<i64>,
        count_limit: Query<Option<i64>>,
        sort_by: Query<Option<String>>,
        order: Query<Option<String>>,
        verification_status: Query<Option<bool>>,
    ) -> ListResponse {
        let (page, limit) = (page.0, limit.0);
        if page < 1 {
            return ListResponse::Unprocessable(error_body("page must be > 0"));
        }
        if limit < 1 {
            return ListResponse::Unprocessable(error_body("limit must be > 0"));
        }
        if limit > config.max_page_limit {
            return ListResponse::Unprocessable(error_body(format!(
                "limit must be <= {}",
                config.max_page_limit
            )));
        }
        let count_limit = count_limit.0.unwrap_or(config.default_count_limit);
        if count_limit < 1 {
            return ListResponse::Unprocessable(error_body("count_limit must be > 0"));
        }
        let sort_by = match sort_by.0.as_deref().map(str::parse::<SortBy>) {
            None => SortBy::default(),
            Some(Ok(sort_by)) => sort_by,
            Some(Err(e)) => return ListResponse::Unprocessable(error_body(e)),
        };
        let order = match order.0.as_deref().map(str::parse::<SortOrder>) {
            None => SortOrder::default(),
            Some(Ok(order)) => order,
            Some(Err(e)) => return ListResponse::Unprocessable(error_body(e)),
        };

        let query = match compile_optional_search(q.0.as_deref()) {
            Ok(query) => query.with_verification_status(verification_status.0),
            Err(e) => {
                tracing::warn!("Rejected search query: {}", e);
                return ListResponse::Unprocessable(error_body(e.to_string()));
            }
        };

        // one row past the page decides `nextPage`; the count never goes past `count_limit`
        let window = FetchWindow::page(page, limit).sorted(sort_by, order);
        let lookahead = FetchWindow {
            limit: Some(limit.saturating_add(1)),
            ..window
        };
        match db
            .find_and_count_cases(&query, &lookahead, Some(count_limit))
            .await
        {
            Ok((mut cases, total)) => {
                let has_more = cases.len() as i64 > limit;
                cases.truncate(limit as usize);
                ListResponse::Ok(ApiResponse::ok(ListCasesResponse {
                    cases: cases.into_iter().map(for_response).collect(),
                    next_page: has_more.then_some(page.saturating_add(1)),
                    total,
                }))
            }
            Err(e) => ListResponse::InternalError(internal_error("Failed to list cases", e)),
        }
    }

    /// Get case by ID
    #[oai(path = "/cases/:id", method = "get", tag = "ApiTags::Cases")]
    async fn get_case(&self, db: Data<&Arc<Database>>, id: Path<String>) -> CaseResponse {
        let case_id = match id.0.parse::<CaseId>() {
            Ok(case_id) => case_id,
            Err(e) => {
                return CaseResponse::Unprocessable(error_body(format!(
                    "Invalid case id {}: {}",
                    id.0, e
                )))
            }
        };
        match db.get_case(&case_id).await {
            Ok(Some(case)) => CaseResponse::Ok(ApiResponse::ok(for_response(case))),
            Ok(None) => CaseResponse::NotFound(not_found(&id.0)),
            Err(e) => CaseResponse::InternalError(internal_error("Failed to get case", e)),
        }
    }

    /// Create case
    ///
    /// Stores `num_cases` identical copies of the body. With `validate_only` the case is
    /// checked and echoed back without being stored.
    #[oai(path = "/cases", method = "post", tag = "ApiTags::Cases")]
    async fn create_case(
        &self,
        db: Data<&Arc<Database>>,
        config: Data<&Arc<AppConfig>>,
        body: Json<Day0Case>,
        num_cases: Query<Option<i64>>,
        #[oai(default = "default_false")] validate_only: Query<bool>,
    ) -> CreateResponse {
        let case = body.0;
        let curator = match check_case_body(&case) {
            Ok(curator) => curator,
            Err(message) => return CreateResponse::Unprocessable(error_body(message)),
        };
        if validate_only.0 {
            return CreateResponse::Created(ApiResponse::ok(CreatedCases { cases: vec![case] }));
        }

        let copies = num_cases.0.unwrap_or(1);
        if copies < 1 {
            return CreateResponse::Unprocessable(error_body("num_cases must be > 0"));
        }
        if copies > config.max_num_cases {
            return CreateResponse::Unprocessable(error_body(format!(
                "num_cases must be <= {}",
                config.max_num_cases
            )));
        }
        let result = if copies == 1 {
            db.insert_case(&case, &curator).await.map(|case| vec![case])
        } else {
            db.insert_cases(&case, copies as usize, &curator).await
        };
        match result {
            Ok(cases) => {
                tracing::info!("Created {} case(s) for {}", cases.len(), curator);
                CreateResponse::Created(ApiResponse::ok(CreatedCases { cases }))
            }
            Err(e) => CreateResponse::InternalError(internal_error("Failed to create case", e)),
        }
    }

    /// Update case
    ///
    /// Replaces the case and bumps its revision number
    #[oai(path = "/cases/:id", method = "put", tag = "ApiTags::Cases")]
    async fn update_case(
        &self,
        db: Data<&Arc<Database>>,
        id: Path<String>,
        body: Json<Day0Case>,
    ) -> CaseResponse {
        let case_id = match id.0.parse::<CaseId>() {
            Ok(case_id) => case_id,
            Err(e) => {
                return CaseResponse::Unprocessable(error_body(format!(
                    "Invalid case id {}: {}",
                    id.0, e
                )))
            }
        };
        let curator = match check_case_body(&body.0) {
            Ok(curator) => curator,
            Err(message) => return CaseResponse::Unprocessable(error_body(message)),
        };
        match db.update_case(&case_id, &body.0, &curator).await {
            Ok(Some(case)) => CaseResponse::Ok(ApiResponse::ok(for_response(case))),
            Ok(None) => CaseResponse::NotFound(not_found(&id.0)),
            Err(e) => CaseResponse::InternalError(internal_error("Failed to update case", e)),
        }
    }

    /// Upsert case
    ///
    /// Updates the case with the same source id and source entry id, or creates it.
    /// Returns 200 when updated and 201 when created.
    #[oai(path = "/cases", method = "put", tag = "ApiTags::Cases")]
    async fn upsert_case(&self, db: Data<&Arc<Database>>, body: Json<Day0Case>) -> CaseResponse {
        let curator = match check_case_body(&body.0) {
            Ok(curator) => curator,
            Err(message) => return CaseResponse::Unprocessable(error_body(message)),
        };
        match db.upsert_case(&body.0, &curator).await {
            Ok(UpsertOutcome::Updated(case)) => {
                CaseResponse::Ok(ApiResponse::ok(for_response(case)))
            }
            Ok(UpsertOutcome::Created(case)) => {
                CaseResponse::Created(ApiResponse::ok(for_response(case)))
            }
            Err(e) => CaseResponse::InternalError(internal_error("Failed to upsert case", e)),
        }
    }

    /// Delete case
    #[oai(path = "/cases/:id", method = "delete", tag = "ApiTags::Cases")]
    async fn delete_case(&self, db: Data<&Arc<Database>>, id: Path<String>) -> DeleteResponse {
        let case_id = match id.0.parse::<CaseId>() {
            Ok(case_id) => case_id,
            Err(e) => {
                return DeleteResponse::Unprocessable(error_body(format!(
                    "Invalid case id {}: {}",
                    id.0, e
                )))
            }
        };
        match db.delete_case(&case_id).await {
            Ok(true) => DeleteResponse::NoContent,
            Ok(false) => DeleteResponse::NotFound(not_found(&id.0)),
            Err(e) => DeleteResponse::InternalError(internal_error("Failed to delete case", e)),
        }
    }

    /// Delete cases
    ///
    /// Deletes every case matching `query`, or exactly the cases in `caseIds`
    #[oai(path = "/cases", method = "delete", tag = "ApiTags::Cases")]
    async fn delete_cases(
        &self,
        db: Data<&Arc<Database>>,
        body: Json<CaseSelection>,
    ) -> DeleteResponse {
        match (&body.query, &body.case_ids) {
            (Some(_), Some(_)) | (None, None) => DeleteResponse::BadRequest(error_body(
                "Exactly one of query and caseIds must be given",
            )),
            (None, Some(raw_ids)) => {
                let ids = match parse_case_ids(raw_ids) {
                    Ok(ids) => ids,
                    Err(message) => return DeleteResponse::Unprocessable(error_body(message)),
                };
                let found = match db.find_cases_by_ids(&ids).await {
                    Ok(found) => found,
                    Err(e) => {
                        return DeleteResponse::InternalError(internal_error(
                            "Failed to look up cases",
                            e,
                        ))
                    }
                };
                if let Some(missing) = ids.iter().map(CaseId::to_hex).find(|hex| {
                    !found.iter().any(|case| case.id.as_deref() == Some(hex.as_str()))
                }) {
                    return DeleteResponse::NotFound(not_found(&missing));
                }
                match db.delete_cases_by_ids(&ids).await {
                    Ok(_) => DeleteResponse::NoContent,
                    Err(e) => {
                        DeleteResponse::InternalError(internal_error("Failed to delete cases", e))
                    }
                }
            }
            (Some(raw_query), None) => {
                let query = match compile_search(raw_query) {
                    Ok(query) => query,
                    Err(e) => return DeleteResponse::Unprocessable(error_body(e.to_string())),
                };
                match body.max_cases_threshold {
                    Some(threshold) if threshold < 0 => {
                        return DeleteResponse::Unprocessable(error_body(
                            "maxCasesThreshold must be >= 0",
                        ))
                    }
                    // zero means no threshold
                    Some(threshold) if threshold > 0 => {
                        let total = match db
                            .count_cases(&query, Some(threshold.saturating_add(1)))
                            .await
                        {
                            Ok(total) => total,
                            Err(e) => {
                                return DeleteResponse::InternalError(internal_error(
                                    "Failed to count cases",
                                    e,
                                ))
                            }
                        };
                        if total > threshold {
                            tracing::warn!(
                                "Refused to delete {} cases for query {}",
                                total,
                                raw_query
                            );
                            return DeleteResponse::Unprocessable(error_body(format!(
                                "query {} will delete {} cases which is more than the maximum allowed of {}",
                                raw_query, total, threshold
                            )));
                        }
                    }
                    _ => {}
                }
                match db.delete_cases(&query).await {
                    Ok(deleted) => {
                        tracing::info!("Deleted {} cases by query", deleted);
                        DeleteResponse::NoContent
                    }
                    Err(e) => {
                        DeleteResponse::InternalError(internal_error("Failed to delete cases", e))
                    }
                }
            }
        }
    }

    /// Batch upsert cases
    ///
    /// Cases that fail validation are reported by index and skipped; the rest are upserted
    #[oai(path = "/cases/batchUpsert", method = "post", tag = "ApiTags::Cases")]
    async fn batch_upsert(
        &self,
        db: Data<&Arc<Database>>,
        body: Json<BatchUpsertRequest>,
    ) -> BatchUpsertResponse {
        let request = body.0;
        let default_curator = request.curator.as_ref().map(|c| c.email.clone());
        let mut errors = Vec::new();
        let mut valid = Vec::with_capacity(request.cases.len());

        for (index, case) in request.cases.into_iter().enumerate() {
            let checked = validate_case(&case).map_err(|e| e.to_string()).and_then(|_| {
                case.curator_email()
                    .map(str::to_string)
                    .or_else(|| default_curator.clone())
                    .ok_or_else(|| "curator email is required".to_string())
            });
            match checked {
                Ok(_) => valid.push(case),
                Err(message) => errors.push(CaseValidationError { index, message }),
            }
        }

        // every valid case carries its own curator or falls back to the request's
        let fallback = default_curator.unwrap_or_default();
        match db.batch_upsert_cases(&valid, &fallback).await {
            Ok(summary) => {
                let result = BatchUpsertResult {
                    num_created: summary.num_created,
                    num_updated: summary.num_updated,
                    num_unchanged: summary.num_unchanged,
                    errors,
                };
                if result.errors.is_empty() {
                    BatchUpsertResponse::Ok(ApiResponse::ok(result))
                } else {
                    tracing::warn!("Batch upsert skipped {} invalid cases", result.errors.len());
                    BatchUpsertResponse::MultiStatus(ApiResponse::ok(result))
                }
            }
            Err(e) => {
                BatchUpsertResponse::InternalError(internal_error("Failed to upsert cases", e))
            }
        }
    }

    /// Update cases by query
    ///
    /// Applies the `case` merge patch to every case matching `query`
    #[oai(path = "/cases/batchUpdateQuery", method = "post", tag = "ApiTags::Cases")]
    async fn batch_update_query(
        &self,
        db: Data<&Arc<Database>>,
        body: Json<BatchUpdateQueryRequest>,
    ) -> BatchUpdateResponse {
        if !body.case.is_object() {
            return BatchUpdateResponse::Unprocessable(error_body("case must be a JSON object"));
        }
        if let Err(e) = crate::validation::validate_email(&body.curator.email) {
            return BatchUpdateResponse::Unprocessable(error_body(e.to_string()));
        }
        let query = match compile_search(&body.query) {
            Ok(query) => query,
            Err(e) => return BatchUpdateResponse::Unprocessable(error_body(e.to_string())),
        };
        match db
            .update_cases(&query, &body.case, &body.curator.email)
            .await
        {
            Ok(num_modified) => {
                BatchUpdateResponse::Ok(ApiResponse::ok(BatchUpdateResult { num_modified }))
            }
            Err(e) => {
                BatchUpdateResponse::InternalError(internal_error("Failed to update cases", e))
            }
        }
    }

    /// Batch update cases
    ///
    /// Replaces existing cases by `_id`. Nothing is written when any id is unknown
    #[oai(path = "/cases/batchUpdate", method = "post", tag = "ApiTags::Cases")]
    async fn batch_update(
        &self,
        db: Data<&Arc<Database>>,
        body: Json<BatchUpdateRequest>,
    ) -> BatchUpdateResponse {
        let request = body.0;
        if request.cases.iter().any(|case| case.id.is_none()) {
            return BatchUpdateResponse::Unprocessable(error_body(
                "Every case must specify its _id",
            ));
        }
        let fallback = request.curator.as_ref().map(|c| c.email.clone());

        let mut updates = Vec::with_capacity(request.cases.len());
        for (index, case) in request.cases.into_iter().enumerate() {
            let raw_id = case.id.clone().unwrap_or_default();
            let id = match raw_id.parse::<CaseId>() {
                Ok(id) => id,
                Err(e) => {
                    return BatchUpdateResponse::Unprocessable(error_body(format!(
                        "Invalid case id {}: {}",
                        raw_id, e
                    )))
                }
            };
            let checked = validate_case(&case).map_err(|e| e.to_string()).and_then(|_| {
                case.curator_email()
                    .map(str::to_string)
                    .or_else(|| fallback.clone())
                    .ok_or_else(|| "curator email is required".to_string())
            });
            if let Err(message) = checked {
                return BatchUpdateResponse::Unprocessable(error_body(format!(
                    "Case {}: {}",
                    index, message
                )));
            }
            updates.push((id, case));
        }

        let ids: Vec<CaseId> = updates.iter().map(|(id, _)| *id).collect();
        let found = match db.find_cases_by_ids(&ids).await {
            Ok(found) => found,
            Err(e) => {
                return BatchUpdateResponse::InternalError(internal_error(
                    "Failed to look up cases",
                    e,
                ))
            }
        };
        if let Some(missing) = ids.iter().map(CaseId::to_hex).find(|hex| {
            !found.iter().any(|case| case.id.as_deref() == Some(hex.as_str()))
        }) {
            return BatchUpdateResponse::BadRequest(error_body(format!(
                "case with id {} not present to update",
                missing
            )));
        }

        match db
            .batch_update_cases(&updates, &fallback.unwrap_or_default())
            .await
        {
            Ok(num_modified) => {
                BatchUpdateResponse::Ok(ApiResponse::ok(BatchUpdateResult { num_modified }))
            }
            Err(e) => {
                BatchUpdateResponse::InternalError(internal_error("Failed to update cases", e))
            }
        }
    }

    /// Case revision history
    ///
    /// Versions of the case archived before each update or delete, oldest first
    #[oai(path = "/cases/:id/revisions", method = "get", tag = "ApiTags::Cases")]
    async fn case_revisions(&self, db: Data<&Arc<Database>>, id: Path<String>) -> RevisionsResponse {
        let case_id = match id.0.parse::<CaseId>() {
            Ok(case_id) => case_id,
            Err(e) => {
                return RevisionsResponse::Unprocessable(error_body(format!(
                    "Invalid case id {}: {}",
                    id.0, e
                )))
            }
        };
        match db.list_case_revisions(&case_id).await {
            Ok(revisions) => RevisionsResponse::Ok(ApiResponse::ok(CaseRevisions {
                revisions: revisions.into_iter().map(for_response).collect(),
            })),
            Err(e) => {
                RevisionsResponse::InternalError(internal_error("Failed to list revisions", e))
            }
        }
    }

    /// Most frequent occupations
    #[oai(path = "/cases/occupations", method = "get", tag = "ApiTags::Cases")]
    async fn list_occupations(
        &self,
        db: Data<&Arc<Database>>,
        limit: Query<Option<i64>>,
    ) -> OccupationsResponse {
        if limit.0.is_some_and(|limit| limit < 1) {
            return OccupationsResponse::Unprocessable(error_body("limit must be > 0"));
        }
        match db.list_occupations(limit.0).await {
            Ok(occupations) => OccupationsResponse::Ok(ApiResponse::ok(OccupationList { occupations })),
            Err(e) => {
                OccupationsResponse::InternalError(internal_error("Failed to list occupations", e))
            }
        }
    }

    /// Cases by country
    ///
    /// Counts per country and overall, by case status and outcome
    #[oai(path = "/cases/countryData", method = "get", tag = "ApiTags::Cases")]
    async fn country_data(&self, db: Data<&Arc<Database>>) -> CountryDataResponse {
        match db.country_data().await {
            Ok(data) => CountryDataResponse::Ok(ApiResponse::ok(data)),
            Err(e) => CountryDataResponse::InternalError(internal_error(
                "Failed to count cases by country",
                e,
            )),
        }
    }

    /// Download cases
    ///
    /// Exports cases matching `query`, or the cases in `caseIds`, as CSV, TSV or JSON
    #[oai(path = "/cases/download", method = "post", tag = "ApiTags::Cases")]
    async fn download_cases(
        &self,
        db: Data<&Arc<Database>>,
        body: Json<DownloadRequest>,
    ) -> poem::Result<Response<Binary<Vec<u8>>>> {
        let request = body.0;
        if request.query.is_some() && request.case_ids.is_some() {
            return Err(poem::Error::from_string(
                "Only one of query and caseIds may be given",
                StatusCode::BAD_REQUEST,
            ));
        }
        let format = parse_format(request.format.as_deref())
            .map_err(|e| poem::Error::from_string(e.to_string(), StatusCode::BAD_REQUEST))?;

        let query = match &request.case_ids {
            Some(raw_ids) => {
                let ids = parse_case_ids(raw_ids).map_err(|message| {
                    poem::Error::from_string(message, StatusCode::UNPROCESSABLE_ENTITY)
                })?;
                CaseQuery::by_ids(&ids, Collation::default())
            }
            None => compile_optional_search(request.query.as_deref())?,
        };

        let mut exporter = CaseExporter::new(Vec::new(), format).map_err(export_failure)?;
        db.stream_cases_for_export(&query, request.limit, |case| exporter.write_case(&case))
            .await
            .map_err(export_failure)?;
        tracing::info!("Exported {} cases as {}", exporter.written(), format.extension());
        let bytes = exporter.finish().map_err(export_failure)?;

        let filename = export_filename(
            request.query.as_deref(),
            format,
            chrono::Utc::now().date_naive(),
        );
        Ok(Response::new(Binary(bytes))
            .header("Content-Type", format.content_type())
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename),
            ))
    }

    /// Verify case
    ///
    /// Records the curator as the case's verifier
    #[oai(path = "/cases/verify/:id", method = "post", tag = "ApiTags::Cases")]
    async fn verify_case(
        &self,
        db: Data<&Arc<Database>>,
        id: Path<String>,
        body: Json<VerifyCaseRequest>,
    ) -> CaseResponse {
        let case_id = match id.0.parse::<CaseId>() {
            Ok(case_id) => case_id,
            Err(e) => {
                return CaseResponse::Unprocessable(error_body(format!(
                    "Invalid case id {}: {}",
                    id.0, e
                )))
            }
        };
        if let Err(e) = crate::validation::validate_email(&body.curator.email) {
            return CaseResponse::Unprocessable(error_body(e.to_string()));
        }
        match db.verify_case(&case_id, &body.curator).await {
            Ok(Some(case)) => CaseResponse::Ok(ApiResponse::ok(for_response(case))),
            Ok(None) => CaseResponse::NotFound(not_found(&id.0)),
            Err(e) => CaseResponse::InternalError(internal_error("Failed to verify case", e)),
        }
    }
}

fn export_failure(e: anyhow::Error) -> poem::Error {
    tracing::error!("Export failed: {:#}", e);
    poem::Error::from_string(
        format!("Export failed: {}", e),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
}

#[cfg(test)]
mod tests;
