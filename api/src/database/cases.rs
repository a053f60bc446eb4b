use super::types::{BatchUpsertSummary, CaseRow, CountryData, Database, UpsertOutcome};
use crate::model::{CaseId, Curator, Day0Case};
use crate::search::{
    build_count_sql, build_delete_sql, build_export_batch_sql, build_fetch_sql,
    build_snapshot_sql, CaseQuery, FetchWindow, SqlValue,
};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection};
use std::collections::BTreeMap;

type Arguments<'q> = <Sqlite as sqlx::Database>::Arguments<'q>;

/// Rows read per round-trip while exporting.
const EXPORT_BATCH_SIZE: i64 = 500;

/// Case statuses left out of the per-country statistics.
const UNCOUNTED_STATUSES: &str = "('omit_error', 'discarded')";

fn bind_query<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, Arguments<'q>>,
    values: &'q [SqlValue],
) -> sqlx::query::Query<'q, Sqlite, Arguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Integer(i) => query.bind(*i),
        };
    }
    query
}

fn bind_query_as<'q, O>(
    mut query: sqlx::query::QueryAs<'q, Sqlite, O, Arguments<'q>>,
    values: &'q [SqlValue],
) -> sqlx::query::QueryAs<'q, Sqlite, O, Arguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Integer(i) => query.bind(*i),
        };
    }
    query
}

fn case_from_row(row: CaseRow) -> Result<Day0Case> {
    Day0Case::from_document(&row.id, &row.document)
        .with_context(|| format!("Corrupt document for case {}", row.id))
}

async fn insert_row(conn: &mut SqliteConnection, case: &Day0Case) -> Result<Day0Case> {
    let id = CaseId::new().to_hex();
    let document = serde_json::to_string(&case.to_document()?)?;
    sqlx::query("INSERT INTO cases (id, document, search_text) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(&document)
        .bind(case.search_text())
        .execute(&mut *conn)
        .await?;

    let mut stored = case.clone();
    stored.id = Some(id);
    stored.curator = None;
    Ok(stored)
}

async fn replace_row(conn: &mut SqliteConnection, id: &str, case: &Day0Case) -> Result<Day0Case> {
    let document = serde_json::to_string(&case.to_document()?)?;
    sqlx::query(
        "UPDATE cases SET document = ?, search_text = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(&document)
    .bind(case.search_text())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    let mut stored = case.clone();
    stored.id = Some(id.to_string());
    stored.curator = None;
    Ok(stored)
}

/// Archives the current version of a case before it changes or goes away.
async fn snapshot_row(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query(
        r#"INSERT OR IGNORE INTO case_revisions (case_id, revision_number, document)
           SELECT id, COALESCE(json_extract(document, '$.revisionMetadata.revisionNumber'), 0), document
           FROM cases WHERE id = ?"#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn snapshot_matching(conn: &mut SqliteConnection, query: &CaseQuery) -> Result<u64> {
    let statement = build_snapshot_sql(query);
    let result = bind_query(sqlx::query(&statement.sql), &statement.values)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn get_row(conn: &mut SqliteConnection, id: &str) -> Result<Option<Day0Case>> {
    let row = sqlx::query_as::<_, CaseRow>("SELECT id, document FROM cases WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(case_from_row).transpose()
}

async fn find_by_source(
    conn: &mut SqliteConnection,
    source_id: &str,
    source_entry_id: &str,
) -> Result<Option<Day0Case>> {
    let row = sqlx::query_as::<_, CaseRow>(
        r#"SELECT id, document FROM cases
           WHERE json_extract(document, '$.caseReference.sourceId') = ?
             AND json_extract(document, '$.caseReference.sourceEntryId') = ?
           ORDER BY seq LIMIT 1"#,
    )
    .bind(source_id)
    .bind(source_entry_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(case_from_row).transpose()
}

/// Creates or replaces the case sharing `case`'s source entry.
async fn upsert_row(
    conn: &mut SqliteConnection,
    case: &Day0Case,
    curator: &str,
) -> Result<UpsertOutcome> {
    let now = Utc::now();
    let existing = match case.case_reference.source_entry_id.as_deref() {
        Some(entry_id) => {
            find_by_source(conn, &case.case_reference.source_id, entry_id).await?
        }
        None => None,
    };

    match existing {
        Some(previous) => {
            let id = previous.id.clone().unwrap_or_default();
            let mut updated = case.clone();
            updated.set_updated(&previous, curator, "Case upsert", now);
            snapshot_row(conn, &id).await?;
            Ok(UpsertOutcome::Updated(replace_row(conn, &id, &updated).await?))
        }
        None => {
            let mut created = case.clone();
            created.set_created(curator, now);
            Ok(UpsertOutcome::Created(insert_row(conn, &created).await?))
        }
    }
}

impl Database {
    /// Stores a new case with fresh revision metadata
    pub async fn insert_case(&self, case: &Day0Case, curator: &str) -> Result<Day0Case> {
        let mut created = case.clone();
        created.set_created(curator, Utc::now());
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut *conn, &created).await
    }

    /// Stores `copies` identical cases in one transaction
    pub async fn insert_cases(
        &self,
        case: &Day0Case,
        copies: usize,
        curator: &str,
    ) -> Result<Vec<Day0Case>> {
        let mut created = case.clone();
        created.set_created(curator, Utc::now());

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(copies);
        for _ in 0..copies {
            stored.push(insert_row(&mut *tx, &created).await?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    pub async fn get_case(&self, id: &CaseId) -> Result<Option<Day0Case>> {
        let mut conn = self.pool.acquire().await?;
        get_row(&mut *conn, &id.to_hex()).await
    }

    /// Replaces an existing case, bumping its revision. `None` if it does not exist.
    pub async fn update_case(
        &self,
        id: &CaseId,
        case: &Day0Case,
        curator: &str,
    ) -> Result<Option<Day0Case>> {
        let id = id.to_hex();
        let mut tx = self.pool.begin().await?;
        let Some(previous) = get_row(&mut *tx, &id).await? else {
            return Ok(None);
        };

        let mut updated = case.clone();
        updated.set_updated(&previous, curator, "Case update", Utc::now());
        snapshot_row(&mut *tx, &id).await?;
        let stored = replace_row(&mut *tx, &id, &updated).await?;
        tx.commit().await?;
        Ok(Some(stored))
    }

    /// Replaces each `(id, case)` pair in one transaction. Ids with no stored case
    /// are skipped. Returns the number of cases replaced.
    pub async fn batch_update_cases(
        &self,
        updates: &[(CaseId, Day0Case)],
        curator: &str,
    ) -> Result<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut modified = 0u64;
        for (id, case) in updates {
            let id = id.to_hex();
            let Some(previous) = get_row(&mut *tx, &id).await? else {
                continue;
            };
            let curator = case.curator_email().unwrap_or(curator);
            let mut updated = case.clone();
            updated.set_updated(&previous, curator, "Case batch update", now);
            snapshot_row(&mut *tx, &id).await?;
            replace_row(&mut *tx, &id, &updated).await?;
            modified += 1;
        }
        tx.commit().await?;
        tracing::info!("Batch update: {} of {} cases replaced", modified, updates.len());
        Ok(modified)
    }

    pub async fn upsert_case(&self, case: &Day0Case, curator: &str) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = upsert_row(&mut *tx, case, curator).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Upserts every case in one transaction
    pub async fn batch_upsert_cases(
        &self,
        cases: &[Day0Case],
        curator: &str,
    ) -> Result<BatchUpsertSummary> {
        let mut tx = self.pool.begin().await?;
        let mut summary = BatchUpsertSummary::default();
        for case in cases {
            if let Some(entry_id) = case.case_reference.source_entry_id.as_deref() {
                let existing =
                    find_by_source(&mut *tx, &case.case_reference.source_id, entry_id).await?;
                if existing.is_some_and(|existing| existing.same_content(case)) {
                    summary.num_unchanged += 1;
                    continue;
                }
            }
            let curator = case.curator_email().unwrap_or(curator);
            match upsert_row(&mut *tx, case, curator).await? {
                UpsertOutcome::Created(_) => summary.num_created += 1,
                UpsertOutcome::Updated(_) => summary.num_updated += 1,
            }
        }
        tx.commit().await?;
        tracing::info!(
            "Batch upsert: {} created, {} updated, {} unchanged",
            summary.num_created,
            summary.num_updated,
            summary.num_unchanged
        );
        Ok(summary)
    }

    pub async fn delete_case(&self, id: &CaseId) -> Result<bool> {
        let id = id.to_hex();
        let mut tx = self.pool.begin().await?;
        snapshot_row(&mut *tx, &id).await?;
        let result = sqlx::query("DELETE FROM cases WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every case matching `query`, archiving each one first
    pub async fn delete_cases(&self, query: &CaseQuery) -> Result<u64> {
        let statement = build_delete_sql(query);
        let mut tx = self.pool.begin().await?;
        snapshot_matching(&mut *tx, query).await?;
        let result = bind_query(sqlx::query(&statement.sql), &statement.values)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_cases_by_ids(&self, ids: &[CaseId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete_cases(&CaseQuery::by_ids(ids, Default::default()))
            .await
    }

    /// One window of cases matching `query`
    pub async fn find_cases(&self, query: &CaseQuery, window: &FetchWindow) -> Result<Vec<Day0Case>> {
        let statement = build_fetch_sql(query, window);
        let rows = bind_query_as(sqlx::query_as::<_, CaseRow>(&statement.sql), &statement.values)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(case_from_row).collect()
    }

    /// Number of cases matching `query`, never above `cap`
    pub async fn count_cases(&self, query: &CaseQuery, cap: Option<i64>) -> Result<i64> {
        let statement = build_count_sql(query, cap);
        let count: (i64,) =
            bind_query_as(sqlx::query_as::<_, (i64,)>(&statement.sql), &statement.values)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    /// Page of results plus the capped total, run concurrently
    pub async fn find_and_count_cases(
        &self,
        query: &CaseQuery,
        window: &FetchWindow,
        cap: Option<i64>,
    ) -> Result<(Vec<Day0Case>, i64)> {
        tokio::try_join!(self.find_cases(query, window), self.count_cases(query, cap))
    }

    pub async fn find_cases_by_ids(&self, ids: &[CaseId]) -> Result<Vec<Day0Case>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = CaseQuery::by_ids(ids, Default::default());
        self.find_cases(&query, &FetchWindow::default()).await
    }

    /// Walks matching cases in insertion order, a batch at a time, handing each to `on_case`.
    /// Returns how many cases were visited.
    pub async fn stream_cases_for_export<F>(
        &self,
        query: &CaseQuery,
        limit: Option<i64>,
        mut on_case: F,
    ) -> Result<usize>
    where
        F: FnMut(Day0Case) -> Result<()>,
    {
        let mut after_seq = 0i64;
        let mut visited = 0usize;

        loop {
            let batch_size = match limit {
                Some(limit) => (limit - visited as i64).min(EXPORT_BATCH_SIZE),
                None => EXPORT_BATCH_SIZE,
            };
            if batch_size <= 0 {
                break;
            }

            let statement = build_export_batch_sql(query, after_seq, batch_size);
            let rows = bind_query_as(
                sqlx::query_as::<_, (i64, String, String)>(&statement.sql),
                &statement.values,
            )
            .fetch_all(&self.pool)
            .await?;

            let fetched = rows.len() as i64;
            for (seq, id, document) in rows {
                after_seq = seq;
                on_case(case_from_row(CaseRow { id, document })?)?;
                visited += 1;
            }
            if fetched < batch_size {
                break;
            }
        }

        tracing::debug!("Exported {} cases", visited);
        Ok(visited)
    }

    /// Applies a JSON merge patch to every case matching `query`. Returns the number modified.
    pub async fn update_cases(
        &self,
        query: &CaseQuery,
        patch: &serde_json::Value,
        curator: &str,
    ) -> Result<u64> {
        let statement = build_fetch_sql(query, &FetchWindow::default());
        let mut tx = self.pool.begin().await?;
        snapshot_matching(&mut *tx, query).await?;
        let rows = bind_query_as(sqlx::query_as::<_, CaseRow>(&statement.sql), &statement.values)
            .fetch_all(&mut *tx)
            .await?;

        let now = Utc::now();
        let mut modified = 0u64;
        for row in rows {
            let previous = case_from_row(row.clone())?;
            let mut document: serde_json::Value = serde_json::from_str(&row.document)?;
            json_patch::merge(&mut document, patch);
            let mut updated = Day0Case::from_document(&row.id, &document.to_string())
                .with_context(|| format!("Patch produces an invalid case {}", row.id))?;
            updated.set_updated(&previous, curator, "Case update by query", now);
            replace_row(&mut *tx, &row.id, &updated).await?;
            modified += 1;
        }
        tx.commit().await?;
        Ok(modified)
    }

    /// Marks a case as verified by `verifier`
    pub async fn verify_case(&self, id: &CaseId, verifier: &Curator) -> Result<Option<Day0Case>> {
        let id = id.to_hex();
        let mut tx = self.pool.begin().await?;
        let Some(previous) = get_row(&mut *tx, &id).await? else {
            return Ok(None);
        };

        let mut verified = previous.clone();
        verified
            .curators
            .get_or_insert_with(Default::default)
            .verified_by = Some(verifier.clone());
        verified.set_updated(&previous, &verifier.email, "Case Verification", Utc::now());
        snapshot_row(&mut *tx, &id).await?;
        let stored = replace_row(&mut *tx, &id, &verified).await?;
        tx.commit().await?;
        Ok(Some(stored))
    }

    /// Archived versions of a case, oldest revision first
    pub async fn list_case_revisions(&self, id: &CaseId) -> Result<Vec<Day0Case>> {
        let rows = sqlx::query_as::<_, CaseRow>(
            "SELECT case_id AS id, document FROM case_revisions WHERE case_id = ? ORDER BY revision_number, seq",
        )
        .bind(id.to_hex())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(case_from_row).collect()
    }

    /// Occupations by how many cases list them, most frequent first
    pub async fn list_occupations(&self, limit: Option<i64>) -> Result<Vec<String>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT json_extract(document, '$.demographics.occupation') AS occupation, COUNT(*) AS n
               FROM cases
               WHERE json_type(document, '$.demographics.occupation') = 'text'
               GROUP BY occupation
               ORDER BY n DESC, occupation ASC
               LIMIT ?"#,
        )
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(occupation, _)| occupation).collect())
    }

    /// Case counts by country, status and outcome. Omitted and discarded cases are not counted.
    pub async fn country_data(&self) -> Result<CountryData> {
        let statuses: Vec<(String, String, i64)> = sqlx::query_as(&format!(
            r#"SELECT json_extract(document, '$.location.country') AS country,
                      json_extract(document, '$.caseStatus') AS status,
                      COUNT(*)
               FROM cases
               WHERE json_extract(document, '$.caseStatus') NOT IN {}
               GROUP BY country, status"#,
            UNCOUNTED_STATUSES
        ))
        .fetch_all(&self.pool)
        .await?;
        let outcomes: Vec<(String, String, i64)> = sqlx::query_as(&format!(
            r#"SELECT json_extract(document, '$.location.country') AS country,
                      json_extract(document, '$.events.outcome') AS outcome,
                      COUNT(*)
               FROM cases
               WHERE json_extract(document, '$.caseStatus') NOT IN {}
                 AND json_type(document, '$.events.outcome') = 'text'
               GROUP BY country, outcome"#,
            UNCOUNTED_STATUSES
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut data = CountryData::default();
        let mut grand_total = 0i64;
        for (country, status, count) in statuses {
            let entry = data.countries.entry(country).or_insert_with(BTreeMap::new);
            *entry.entry(status.clone()).or_insert(0) += count;
            *entry.entry("total".to_string()).or_insert(0) += count;
            *data.globally.entry(status).or_insert(0) += count;
            grand_total += count;
        }
        for (country, outcome, count) in outcomes {
            let entry = data.countries.entry(country).or_insert_with(BTreeMap::new);
            *entry.entry(outcome.clone()).or_insert(0) += count;
            *data.globally.entry(outcome).or_insert(0) += count;
        }
        data.globally.insert("total".to_string(), grand_total);
        Ok(data)
    }
}
