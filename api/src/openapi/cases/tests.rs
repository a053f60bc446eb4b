use crate::config::AppConfig;
use crate::database::test_helpers::{sample_case, setup_test_db, test_curator};
use crate::database::Database;
use poem::http::StatusCode;
use poem::test::{TestClient, TestResponse};
use poem::Endpoint;
use serde_json::{json, Value};
use std::sync::Arc;

async fn setup() -> (Arc<Database>, TestClient<impl Endpoint>) {
    let db = Arc::new(setup_test_db().await);
    let app = crate::build_app(db.clone(), Arc::new(AppConfig::default()));
    (db, TestClient::new(app))
}

async fn body_json(resp: TestResponse) -> Value {
    resp.0
        .into_body()
        .into_json::<Value>()
        .await
        .expect("response body is JSON")
}

async fn body_text(resp: TestResponse) -> String {
    resp.0.into_body().into_string().await.expect("text body")
}

fn case_body(country: &str, iso3: &str) -> Value {
    json!({
        "caseStatus": "confirmed",
        "pathogen": "COVID-19",
        "caseReference": {
            "sourceId": "5ea86423bae6982635d2e1f8",
            "sourceUrl": "https://example.com/source"
        },
        "location": { "country": country, "countryISO3": iso3 },
        "events": { "dateEntry": "2020-03-01T00:00:00Z" },
        "curator": { "email": "curator@example.com" }
    })
}

async fn seed(db: &Database, country: &str, iso3: &str, count: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for _ in 0..count {
        let stored = db
            .insert_case(&sample_case(country, iso3), "curator@example.com")
            .await
            .unwrap();
        ids.push(stored.id.unwrap());
    }
    ids
}

#[tokio::test]
async fn test_health() {
    let (_db, cli) = setup().await;
    let resp = cli.get("/api/health").send().await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["environment"], "development");
}

#[tokio::test]
async fn test_create_and_get_case() {
    let (_db, cli) = setup().await;
    let mut body = case_body("Peru", "PER");
    body["caseReference"]["sourceEntryId"] = json!("entry-1");

    let resp = cli.post("/api/cases").body_json(&body).send().await;
    resp.assert_status(StatusCode::CREATED);
    let created = body_json(resp).await;
    let id = created["data"]["cases"][0]["_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 24);

    let resp = cli.get(format!("/api/cases/{}", id)).send().await;
    resp.assert_status_is_ok();
    let fetched = body_json(resp).await;
    assert_eq!(fetched["data"]["location"]["countryISO3"], "PER");
    assert_eq!(fetched["data"]["revisionMetadata"]["revisionNumber"], 0);
    assert!(fetched["data"]["caseReference"].get("sourceEntryId").is_none());
}

#[tokio::test]
async fn test_get_missing_and_malformed_ids() {
    let (_db, cli) = setup().await;
    cli.get("/api/cases/5f0f1f2f3f4f5f6f7f8f9fa0")
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
    cli.get("/api/cases/not-an-id")
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_rejects_invalid_cases() {
    let (_db, cli) = setup().await;

    let bad_iso = case_body("Peru", "PE");
    let resp = cli.post("/api/cases").body_json(&bad_iso).send().await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await["success"], false);

    let mut no_curator = case_body("Peru", "PER");
    no_curator.as_object_mut().unwrap().remove("curator");
    let resp = cli.post("/api/cases").body_json(&no_curator).send().await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await["error"], "curator email is required");
}

#[tokio::test]
async fn test_create_copies_and_validate_only() {
    let (db, cli) = setup().await;
    let body = case_body("Peru", "PER");

    let resp = cli
        .post("/api/cases")
        .query("num_cases", &3)
        .body_json(&body)
        .send()
        .await;
    resp.assert_status(StatusCode::CREATED);
    assert_eq!(body_json(resp).await["data"]["cases"].as_array().unwrap().len(), 3);

    cli.post("/api/cases")
        .query("validate_only", &true)
        .body_json(&body)
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    let all = crate::search::CaseQuery::all(Default::default());
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_create_rejects_too_many_copies() {
    let (db, cli) = setup().await;
    let body = case_body("Peru", "PER");
    let max = AppConfig::default().max_num_cases;

    for num_cases in [max + 1, i64::MAX] {
        let resp = cli
            .post("/api/cases")
            .query("num_cases", &num_cases)
            .body_json(&body)
            .send()
            .await;
        resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(resp).await["error"],
            format!("num_cases must be <= {}", max)
        );
    }
    let all = crate::search::CaseQuery::all(Default::default());
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_pages_and_totals() {
    let (db, cli) = setup().await;
    seed(&db, "Peru", "PER", 3).await;
    seed(&db, "Germany", "DEU", 12).await;

    let resp = cli
        .get("/api/cases")
        .query("q", &"country:deu")
        .query("limit", &5)
        .send()
        .await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 12);
    assert_eq!(body["data"]["nextPage"], 2);
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 5);

    let resp = cli
        .get("/api/cases")
        .query("q", &"country:DEU")
        .query("limit", &5)
        .query("page", &3)
        .send()
        .await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 2);
    assert!(body["data"].get("nextPage").is_none());

    let resp = cli.get("/api/cases").send().await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 15);
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_list_count_limit_caps_total_only() {
    let (db, cli) = setup().await;
    seed(&db, "Germany", "DEU", 12).await;

    let resp = cli
        .get("/api/cases")
        .query("limit", &5)
        .query("count_limit", &4)
        .send()
        .await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"]["nextPage"], 2);
}

#[tokio::test]
async fn test_list_deep_page_keeps_count_capped() {
    let (db, cli) = setup().await;
    seed(&db, "Germany", "DEU", 12).await;

    let resp = cli
        .get("/api/cases")
        .query("limit", &5)
        .query("page", &2)
        .query("count_limit", &4)
        .send()
        .await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"]["nextPage"], 3);

    let resp = cli
        .get("/api/cases")
        .query("limit", &5)
        .query("page", &3)
        .query("count_limit", &4)
        .send()
        .await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["cases"].as_array().unwrap().len(), 2);
    assert!(body["data"].get("nextPage").is_none());

    let resp = cli
        .get("/api/cases")
        .query("limit", &5)
        .query("page", &(i64::MAX / 5))
        .send()
        .await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 12);
    assert!(body["data"]["cases"].as_array().unwrap().is_empty());
    assert!(body["data"].get("nextPage").is_none());
}

#[tokio::test]
async fn test_list_rejects_bad_parameters() {
    let (_db, cli) = setup().await;
    for (name, value) in [("page", "0"), ("limit", "0"), ("sort_by", "colour"), ("order", "up")] {
        cli.get("/api/cases")
            .query(name, &value)
            .send()
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let resp = cli.get("/api/cases").query("q", &"caseId:xyz").send().await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid search query caseId:xyz"));
}

#[tokio::test]
async fn test_update_case_bumps_revision() {
    let (db, cli) = setup().await;
    let id = seed(&db, "Peru", "PER", 1).await.remove(0);

    let mut body = case_body("Peru", "PER");
    body["notes"] = json!("reviewed");
    let resp = cli
        .put(format!("/api/cases/{}", id))
        .body_json(&body)
        .send()
        .await;
    resp.assert_status_is_ok();
    let updated = body_json(resp).await;
    assert_eq!(updated["data"]["notes"], "reviewed");
    assert_eq!(updated["data"]["revisionMetadata"]["revisionNumber"], 1);

    cli.put("/api/cases/5f0f1f2f3f4f5f6f7f8f9fa0")
        .body_json(&body)
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let (_db, cli) = setup().await;
    let mut body = case_body("Peru", "PER");
    body["caseReference"]["sourceEntryId"] = json!("entry-9");

    cli.put("/api/cases")
        .body_json(&body)
        .send()
        .await
        .assert_status(StatusCode::CREATED);

    body["notes"] = json!("second load");
    let resp = cli.put("/api/cases").body_json(&body).send().await;
    resp.assert_status_is_ok();
    let updated = body_json(resp).await;
    assert_eq!(updated["data"]["notes"], "second load");
    assert_eq!(updated["data"]["revisionMetadata"]["revisionNumber"], 1);
}

#[tokio::test]
async fn test_delete_single_case() {
    let (db, cli) = setup().await;
    let id = seed(&db, "Peru", "PER", 1).await.remove(0);

    cli.delete(format!("/api/cases/{}", id))
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);
    cli.delete(format!("/api/cases/{}", id))
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete() {
    let (db, cli) = setup().await;
    let peru = seed(&db, "Peru", "PER", 2).await;
    seed(&db, "Germany", "DEU", 3).await;
    let all = crate::search::CaseQuery::all(Default::default());

    cli.delete("/api/cases")
        .body_json(&json!({ "query": "country:PER", "caseIds": peru }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    cli.delete("/api/cases")
        .body_json(&json!({ "caseIds": [peru[0], "5f0f1f2f3f4f5f6f7f8f9fa0"] }))
        .send()
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 5);

    cli.delete("/api/cases")
        .body_json(&json!({ "caseIds": peru }))
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 3);

    cli.delete("/api/cases")
        .body_json(&json!({ "query": "country:deu" }))
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_delete_threshold() {
    let (db, cli) = setup().await;
    seed(&db, "Germany", "DEU", 3).await;
    let all = crate::search::CaseQuery::all(Default::default());

    let resp = cli
        .delete("/api/cases")
        .body_json(&json!({ "query": "country:DEU", "maxCasesThreshold": 2 }))
        .send()
        .await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(resp).await["error"],
        "query country:DEU will delete 3 cases which is more than the maximum allowed of 2"
    );
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 3);

    cli.delete("/api/cases")
        .body_json(&json!({ "query": "country:DEU", "maxCasesThreshold": -1 }))
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    cli.delete("/api/cases")
        .body_json(&json!({ "query": "country:DEU", "maxCasesThreshold": 3 }))
        .send()
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(db.count_cases(&all, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_update_by_id() {
    let (db, cli) = setup().await;
    let ids = seed(&db, "Peru", "PER", 2).await;

    let mut first = case_body("Peru", "PER");
    first["_id"] = json!(ids[0]);
    first["notes"] = json!("first");
    let mut second = case_body("Peru", "PER");
    second["_id"] = json!(ids[1]);
    second["notes"] = json!("second");

    cli.post("/api/cases/batchUpdate")
        .body_json(&json!({ "cases": [first, case_body("Peru", "PER")] }))
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let mut unknown = case_body("Peru", "PER");
    unknown["_id"] = json!("5f0f1f2f3f4f5f6f7f8f9fa0");
    let resp = cli
        .post("/api/cases/batchUpdate")
        .body_json(&json!({ "cases": [first, unknown] }))
        .send()
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp).await["error"],
        "case with id 5f0f1f2f3f4f5f6f7f8f9fa0 not present to update"
    );
    let untouched = db
        .get_case(&ids[0].parse::<crate::model::CaseId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(untouched.notes.is_none());

    let resp = cli
        .post("/api/cases/batchUpdate")
        .body_json(&json!({ "cases": [first, second] }))
        .send()
        .await;
    resp.assert_status_is_ok();
    assert_eq!(body_json(resp).await["data"]["numModified"], 2);

    let resp = cli.get(format!("/api/cases/{}", ids[1])).send().await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["notes"], "second");
    assert_eq!(body["data"]["revisionMetadata"]["revisionNumber"], 1);

    let resp = cli.get(format!("/api/cases/{}/revisions", ids[1])).send().await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    let revisions = body["data"]["revisions"].as_array().unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0]["revisionMetadata"]["revisionNumber"], 0);
    assert!(revisions[0].get("notes").is_none());

    cli.get("/api/cases/not-an-id/revisions")
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_occupations_and_country_data() {
    let (_db, cli) = setup().await;
    for occupation in ["nurse", "nurse", "farmer"] {
        let mut body = case_body("Peru", "PER");
        body["demographics"] = json!({ "occupation": occupation });
        body["events"]["outcome"] = json!("recovered");
        cli.post("/api/cases")
            .body_json(&body)
            .send()
            .await
            .assert_status(StatusCode::CREATED);
    }

    let resp = cli.get("/api/cases/occupations").send().await;
    resp.assert_status_is_ok();
    assert_eq!(
        body_json(resp).await["data"]["occupations"],
        json!(["nurse", "farmer"])
    );
    cli.get("/api/cases/occupations")
        .query("limit", &0)
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let resp = cli.get("/api/cases/countryData").send().await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["countries"]["Peru"]["confirmed"], 3);
    assert_eq!(body["data"]["countries"]["Peru"]["recovered"], 3);
    assert_eq!(body["data"]["globally"]["total"], 3);
}

#[tokio::test]
async fn test_batch_upsert_reports_invalid_cases() {
    let (_db, cli) = setup().await;
    let mut first = case_body("Peru", "PER");
    first["caseReference"]["sourceEntryId"] = json!("a");
    let invalid = case_body("Peru", "PERU");
    let mut third = case_body("Germany", "DEU");
    third["caseReference"]["sourceEntryId"] = json!("b");

    let resp = cli
        .post("/api/cases/batchUpsert")
        .body_json(&json!({ "cases": [first, invalid, third] }))
        .send()
        .await;
    resp.assert_status(StatusCode::MULTI_STATUS);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["numCreated"], 2);
    assert_eq!(body["data"]["numUpdated"], 0);
    assert_eq!(body["data"]["errors"][0]["index"], 1);

    let resp = cli
        .post("/api/cases/batchUpsert")
        .body_json(&json!({ "cases": [first] }))
        .send()
        .await;
    resp.assert_status_is_ok();
    let body = body_json(resp).await;
    assert_eq!(body["data"]["numUpdated"], 0);
    assert_eq!(body["data"]["numUnchanged"], 1);

    first["notes"] = json!("corrected");
    let resp = cli
        .post("/api/cases/batchUpsert")
        .body_json(&json!({ "cases": [first] }))
        .send()
        .await;
    resp.assert_status_is_ok();
    assert_eq!(body_json(resp).await["data"]["numUpdated"], 1);
}

#[tokio::test]
async fn test_batch_update_by_query() {
    let (db, cli) = setup().await;
    seed(&db, "Peru", "PER", 2).await;
    seed(&db, "Germany", "DEU", 1).await;

    let resp = cli
        .post("/api/cases/batchUpdateQuery")
        .body_json(&json!({
            "query": "country:PER",
            "case": { "notes": "bulk edited" },
            "curator": { "email": "editor@example.com" }
        }))
        .send()
        .await;
    resp.assert_status_is_ok();
    assert_eq!(body_json(resp).await["data"]["numModified"], 2);

    let resp = cli
        .post("/api/cases/batchUpdateQuery")
        .body_json(&json!({
            "query": "",
            "case": { "notes": "x" },
            "curator": { "email": "editor@example.com" }
        }))
        .send()
        .await;
    resp.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_download_csv() {
    let (db, cli) = setup().await;
    seed(&db, "Peru", "PER", 2).await;
    seed(&db, "Germany", "DEU", 1).await;

    let resp = cli
        .post("/api/cases/download")
        .body_json(&json!({ "query": "country:PER" }))
        .send()
        .await;
    resp.assert_status_is_ok();
    resp.assert_header("content-type", "text/csv");
    let disposition = resp
        .0
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"day0_"));
    assert!(disposition.ends_with("_country_PER.csv\""));

    let text = body_text(resp).await;
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("_id,"));
}

#[tokio::test]
async fn test_download_json_by_ids_with_limit() {
    let (db, cli) = setup().await;
    let ids = seed(&db, "Peru", "PER", 3).await;

    let resp = cli
        .post("/api/cases/download")
        .body_json(&json!({ "caseIds": ids, "format": "json", "limit": 2 }))
        .send()
        .await;
    resp.assert_status_is_ok();
    resp.assert_header("content-type", "application/json");
    let exported: Vec<Value> = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(exported.len(), 2);
    assert_eq!(exported[0]["location.countryISO3"], "PER");
}

#[tokio::test]
async fn test_download_rejects_bad_requests() {
    let (db, cli) = setup().await;
    let ids = seed(&db, "Peru", "PER", 1).await;

    cli.post("/api/cases/download")
        .body_json(&json!({ "query": "country:PER", "caseIds": ids }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    cli.post("/api/cases/download")
        .body_json(&json!({ "query": "country:PER", "format": "xlsx" }))
        .send()
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    cli.post("/api/cases/download")
        .body_json(&json!({ "query": "dateConfirmedFrom:yesterday" }))
        .send()
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_verify_case_and_filter_by_status() {
    let (db, cli) = setup().await;
    let ids = seed(&db, "Peru", "PER", 2).await;

    let resp = cli
        .post(format!("/api/cases/verify/{}", ids[0]))
        .body_json(&json!({ "curator": test_curator() }))
        .send()
        .await;
    resp.assert_status_is_ok();
    let verified = body_json(resp).await;
    assert_eq!(
        verified["data"]["curators"]["verifiedBy"]["email"],
        "curator@example.com"
    );

    let resp = cli
        .get("/api/cases")
        .query("verification_status", &true)
        .send()
        .await;
    let body = body_json(resp).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["cases"][0]["_id"], ids[0].as_str());

    let resp = cli
        .get("/api/cases")
        .query("verification_status", &false)
        .send()
        .await;
    assert_eq!(body_json(resp).await["data"]["total"], 1);
}
