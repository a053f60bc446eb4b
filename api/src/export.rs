//! Case export as CSV, TSV or JSON.
//!
//! Every case is flattened to dotted column names (`location.countryISO3`)
//! over a fixed header list. `caseReference.sourceEntryId` is never exported.

use crate::model::Day0Case;
use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

/// Exported columns, sorted case-insensitively.
pub const EXPORT_COLUMNS: &[&str] = &[
    "_id",
    "caseReference.isGovernmentSource",
    "caseReference.sourceId",
    "caseReference.sourceUrl",
    "caseReference.uploadIds",
    "caseStatus",
    "curators.createdBy.email",
    "curators.createdBy.name",
    "curators.verifiedBy.email",
    "curators.verifiedBy.name",
    "demographics.ageRange.end",
    "demographics.ageRange.start",
    "demographics.gender",
    "demographics.healthcareWorker",
    "demographics.occupation",
    "events.confirmationMethod",
    "events.dateConfirmation",
    "events.dateDeath",
    "events.dateEntry",
    "events.dateHospitalization",
    "events.dateLastModified",
    "events.dateOnset",
    "events.dateRecovered",
    "events.hospitalized",
    "events.intensiveCare",
    "events.outcome",
    "location.country",
    "location.countryISO3",
    "location.geometry.latitude",
    "location.geometry.longitude",
    "location.location",
    "location.place",
    "location.query",
    "notes",
    "pathogen",
    "preexistingCondition",
    "revisionMetadata.creationMetadata.curator",
    "revisionMetadata.creationMetadata.date",
    "revisionMetadata.creationMetadata.notes",
    "revisionMetadata.revisionNumber",
    "revisionMetadata.updateMetadata.curator",
    "revisionMetadata.updateMetadata.date",
    "revisionMetadata.updateMetadata.notes",
    "symptoms",
    "transmission",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Tsv => "text/tsv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("Invalid format requested {}", other)),
        }
    }
}

/// `day0_<date>_<description>.<ext>`, where the description is the query
/// with colons and whitespace replaced by underscores.
pub fn export_filename(query: Option<&str>, format: ExportFormat, date: chrono::NaiveDate) -> String {
    let description = match query {
        Some(q) if !q.trim().is_empty() => q
            .chars()
            .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
            .collect(),
        _ => "requested_cases".to_string(),
    };
    format!(
        "day0_{}_{}.{}",
        date.format("%Y-%m-%d"),
        description,
        format.extension()
    )
}

fn is_date_column(column: &str) -> bool {
    let leaf = column.rsplit('.').next().unwrap_or(column);
    leaf == "date" || leaf.starts_with("date")
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, child, out);
            }
        }
        Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Dotted path to leaf value, without `caseReference.sourceEntryId`.
pub fn flatten_case(case: &Day0Case) -> Result<BTreeMap<String, Value>> {
    let mut case = case.clone();
    case.strip_source_entry_id();
    case.curator = None;
    let mut flat = BTreeMap::new();
    flatten_into("", &serde_json::to_value(&case)?, &mut flat);
    Ok(flat)
}

fn cell(column: &str, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) if is_date_column(column) => {
            // stored dates start with YYYY-MM-DD
            s.get(..10).unwrap_or(s).to_string()
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

enum Sink<W: Write> {
    Delimited(csv::Writer<W>),
    Json { writer: W, first: bool },
}

/// Writes cases one at a time in the requested format.
pub struct CaseExporter<W: Write> {
    sink: Sink<W>,
    written: usize,
}

impl<W: Write> CaseExporter<W> {
    pub fn new(writer: W, format: ExportFormat) -> Result<Self> {
        let sink = match format {
            ExportFormat::Csv | ExportFormat::Tsv => {
                let delimiter = if format == ExportFormat::Tsv { b'\t' } else { b',' };
                let mut csv_writer = csv::WriterBuilder::new()
                    .delimiter(delimiter)
                    .from_writer(writer);
                csv_writer.write_record(EXPORT_COLUMNS)?;
                Sink::Delimited(csv_writer)
            }
            ExportFormat::Json => {
                let mut writer = writer;
                writer.write_all(b"[")?;
                Sink::Json {
                    writer,
                    first: true,
                }
            }
        };
        Ok(Self { sink, written: 0 })
    }

    pub fn write_case(&mut self, case: &Day0Case) -> Result<()> {
        let flat = flatten_case(case)?;
        match &mut self.sink {
            Sink::Delimited(csv_writer) => {
                let row: Vec<String> = EXPORT_COLUMNS
                    .iter()
                    .map(|column| cell(column, flat.get(*column)))
                    .collect();
                csv_writer.write_record(&row)?;
            }
            Sink::Json { writer, first } => {
                let mut object = Map::new();
                for column in EXPORT_COLUMNS {
                    if let Some(value) = flat.get(*column) {
                        object.insert(column.to_string(), value.clone());
                    }
                }
                if !*first {
                    writer.write_all(b",")?;
                }
                *first = false;
                serde_json::to_writer(&mut *writer, &Value::Object(object))?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Closes the document and returns the underlying writer.
    pub fn finish(self) -> Result<W> {
        match self.sink {
            Sink::Delimited(csv_writer) => csv_writer
                .into_inner()
                .map_err(|e| anyhow!("Failed to flush export: {}", e.error())),
            Sink::Json { mut writer, .. } => {
                writer.write_all(b"]")?;
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

/// Parses the `format` field of a download request, defaulting to CSV.
pub fn parse_format(format: Option<&str>) -> Result<ExportFormat> {
    match format {
        None => Ok(ExportFormat::Csv),
        Some(f) => match f.parse() {
            Ok(format) => Ok(format),
            Err(message) => bail!(message),
        },
    }
}
