use crate::database::DEFAULT_DATABASE_URL;
use anyhow::{Context, Result};
use std::env;

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub environment: String,
    /// Upper bound on the total reported by list requests without `count_limit`
    pub default_count_limit: i64,
    /// Largest page a list request may ask for
    pub max_page_limit: i64,
    /// Most copies a single create request may store
    pub max_num_cases: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 8080,
            environment: "development".to_string(),
            default_count_limit: 10_000,
            max_page_limit: 1_000,
            max_num_cases: 1_000,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", name, value)),
        _ => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_var("PORT", defaults.port)?,
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            default_count_limit: parse_var("DEFAULT_COUNT_LIMIT", defaults.default_count_limit)?,
            max_page_limit: parse_var("MAX_PAGE_LIMIT", defaults.max_page_limit)?,
            max_num_cases: parse_var("MAX_NUM_CASES", defaults.max_num_cases)?,
        };
        if config.default_count_limit < 1 || config.max_page_limit < 1 || config.max_num_cases < 1 {
            anyhow::bail!("DEFAULT_COUNT_LIMIT, MAX_PAGE_LIMIT and MAX_NUM_CASES must be positive");
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
