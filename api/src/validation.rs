use crate::model::{AgeRange, Day0Case};
use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_REGEX: OnceLock<Regex> = OnceLock::new();
static ISO3_REGEX: OnceLock<Regex> = OnceLock::new();

const MAX_AGE: i32 = 120;

fn email_regex() -> &'static Regex {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap())
}

fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| Regex::new(r"^https?://[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}(:\d+)?(/.*)?$").unwrap())
}

fn iso3_regex() -> &'static Regex {
    ISO3_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z]{3}$").unwrap())
}

pub fn validate_email(email: &str) -> Result<()> {
    if email.trim().is_empty() {
        bail!("Email cannot be empty");
    }
    if email.len() > 255 {
        bail!("Email is too long (max 255 characters)");
    }
    if !email_regex().is_match(email) {
        bail!("Invalid email format");
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        bail!("URL cannot be empty");
    }
    if url.len() > 2048 {
        bail!("URL is too long (max 2048 characters)");
    }
    if !url_regex().is_match(url) {
        bail!("Invalid URL format (must start with http:// or https://)");
    }
    Ok(())
}

pub fn validate_country_iso3(code: &str) -> Result<()> {
    if !iso3_regex().is_match(code) {
        bail!("countryISO3 must be a 3-letter code, got '{}'", code);
    }
    Ok(())
}

pub fn validate_age_range(range: &AgeRange) -> Result<()> {
    if range.start < 0 || range.end > MAX_AGE {
        bail!("Age range must be within 0-{}", MAX_AGE);
    }
    if range.start > range.end {
        bail!(
            "Age range start ({}) cannot exceed end ({})",
            range.start,
            range.end
        );
    }
    Ok(())
}

/// Checks a case body before it is stored.
pub fn validate_case(case: &Day0Case) -> Result<()> {
    if case.pathogen.trim().is_empty() {
        bail!("pathogen is required");
    }
    if case.case_reference.source_id.trim().is_empty() {
        bail!("caseReference.sourceId is required");
    }
    validate_url(&case.case_reference.source_url)?;
    if case.location.country.trim().is_empty() {
        bail!("location.country is required");
    }
    validate_country_iso3(&case.location.country_iso3)?;
    if let Some(range) = case
        .demographics
        .as_ref()
        .and_then(|d| d.age_range.as_ref())
    {
        validate_age_range(range)?;
    }
    if let Some(curator) = &case.curator {
        validate_email(&curator.email)?;
    }
    Ok(())
}
