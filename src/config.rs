use chrono::{Duration, Local, NaiveDate};
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::parse_date;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub record_path: String,
    pub price_dir: String,
    /// Last date reconstruction may reach.
    pub horizon: NaiveDate,
    pub xirr_guess: f64,
    /// Date the reports are computed for; defaults to the horizon.
    pub report_date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Yesterday in local time: the latest date with a published NAV.
pub fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = required(&env_map, "DATABASE_PATH")?;
        let record_path = required(&env_map, "RECORD_PATH")?;
        let price_dir = required(&env_map, "PRICE_DIR")?;

        let horizon = match env_map.get("HORIZON") {
            Some(raw) => date_value("HORIZON", raw)?,
            None => yesterday(),
        };

        let xirr_guess = env_map
            .get("XIRR_GUESS")
            .map(|s| s.as_str())
            .unwrap_or("0.01")
            .parse::<f64>()
            .ok()
            .filter(|guess| guess.is_finite() && *guess > -1.0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "XIRR_GUESS".to_string(),
                    "must be a number greater than -1".to_string(),
                )
            })?;

        let report_date = match env_map.get("REPORT_DATE") {
            Some(raw) => date_value("REPORT_DATE", raw)?,
            None => horizon,
        };

        Ok(Config {
            database_path,
            record_path,
            price_dir,
            horizon,
            xirr_guess,
            report_date,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn date_value(key: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    parse_date(raw).map_err(|_| {
        ConfigError::InvalidValue(
            key.to_string(),
            format!("must be YYYY-MM-DD or YYYYMMDD, got {}", raw),
        )
    })
}
