//! Price provider backed by a directory of per-fund CSV files.
//!
//! Layout:
//! - `<dir>/<code>.csv` with columns `date,netvalue,comment`
//! - `<dir>/instruments.json` (optional) with fund terms keyed by code

use super::{DataSourceError, PriceProvider};
use crate::domain::{
    parse_date, CorporateAction, Decimal, DividendMode, FeeSchedule, Instrument, InstrumentCode,
    PriceRow, PriceSeries, ShareRounding,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const METADATA_FILE: &str = "instruments.json";

/// Terms of one fund as written in `instruments.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstrumentTerms {
    pub name: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub purchase_fee_percent: Option<rust_decimal::Decimal>,
    /// Alternating label / percent cells, e.g. `["小于7天", "1.50%", "大于等于7天", "0.00%"]`.
    pub redemption_fees: Option<Vec<String>>,
    pub dividend_mode: DividendMode,
    pub share_rounding: ShareRounding,
}

#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    dir: PathBuf,
    /// Price rows after this date are dropped on load.
    horizon: Option<NaiveDate>,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            horizon: None,
        }
    }

    pub fn with_horizon(mut self, horizon: NaiveDate) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse `date,netvalue,comment` rows. Blank comments mean no corporate action.
    pub fn parse_csv(csv_bytes: &[u8]) -> Result<Vec<PriceRow>, DataSourceError> {
        #[derive(Debug, Deserialize)]
        struct Row {
            date: String,
            netvalue: String,
            comment: Option<String>,
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_bytes);

        let mut rows = Vec::new();
        for record in reader.deserialize::<Row>() {
            let row = record.map_err(|e| DataSourceError::ParseError(e.to_string()))?;
            let date = parse_date(&row.date).map_err(|e| {
                DataSourceError::ParseError(format!("invalid date {:?}: {}", row.date, e))
            })?;
            let nav = Decimal::from_str_canonical(&row.netvalue).map_err(|e| {
                DataSourceError::ParseError(format!("invalid netvalue on {}: {}", date, e))
            })?;
            let action = row
                .comment
                .as_deref()
                .map(CorporateAction::from_comment)
                .unwrap_or_default();
            rows.push(PriceRow::new(date, nav).with_action(action));
        }
        Ok(rows)
    }

    /// Parse the metadata file into terms keyed by code.
    pub fn parse_terms(json: &[u8]) -> Result<HashMap<String, InstrumentTerms>, DataSourceError> {
        serde_json::from_slice(json)
            .map_err(|e| DataSourceError::ParseError(format!("{}: {}", METADATA_FILE, e)))
    }

    async fn load_terms(&self, code: &InstrumentCode) -> Result<InstrumentTerms, DataSourceError> {
        let path = self.dir.join(METADATA_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No metadata file, using default terms");
                return Ok(InstrumentTerms::default());
            }
            Err(e) => return Err(DataSourceError::Io(format!("{}: {}", path.display(), e))),
        };
        let mut terms = Self::parse_terms(&bytes)?;
        Ok(terms.remove(code.as_str()).unwrap_or_default())
    }

    async fn load_rows(&self, code: &InstrumentCode) -> Result<Vec<PriceRow>, DataSourceError> {
        let path = self.dir.join(format!("{}.csv", code.as_str()));
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DataSourceError::NotFound(code.to_string())
            } else {
                DataSourceError::Io(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::parse_csv(&bytes)
    }
}

#[async_trait]
impl PriceProvider for CsvPriceProvider {
    async fn instrument(&self, code: &InstrumentCode) -> Result<Instrument, DataSourceError> {
        let terms = self.load_terms(code).await?;
        let mut rows = self.load_rows(code).await?;
        if let Some(horizon) = self.horizon {
            rows.retain(|row| row.date <= horizon);
        }
        let prices = PriceSeries::new(rows).map_err(|e| DataSourceError::InvalidSeries {
            code: code.to_string(),
            message: e.to_string(),
        })?;

        let fee_schedule = match &terms.redemption_fees {
            Some(cells) => FeeSchedule::parse_or_default(cells),
            None => FeeSchedule::free(),
        };
        if prices.is_empty() {
            warn!(%code, "Price file has no rows");
        }

        let mut instrument = Instrument::new(code.clone(), prices)
            .with_fee_schedule(fee_schedule)
            .with_dividend_mode(terms.dividend_mode)
            .with_share_rounding(terms.share_rounding);
        if let Some(name) = terms.name {
            instrument = instrument.with_name(name);
        }
        if let Some(fee) = terms.purchase_fee_percent {
            instrument = instrument.with_purchase_fee(Decimal::new(fee));
        }
        Ok(instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn csv_parsing_rows_and_comments() {
        let csv = b"date,netvalue,comment\n2021-01-04,1.0000,\n20210105,1.0100,0.05\n2021/01/06,0.5100,-2\n";
        let rows = CsvPriceProvider::parse_csv(csv).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].action, CorporateAction::None);
        assert_eq!(rows[1].nav, d("1.01"));
        assert_eq!(
            rows[1].action,
            CorporateAction::Dividend {
                per_share: d("0.05")
            }
        );
        assert_eq!(rows[2].action, CorporateAction::Split { factor: d("2") });
    }

    #[test]
    fn csv_parsing_invalid_nav_errors() {
        let csv = b"date,netvalue,comment\n2021-01-04,abc,\n";
        let err = CsvPriceProvider::parse_csv(csv).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(_)));
    }

    #[test]
    fn terms_parsing_defaults_missing_fields() {
        let json = br#"{"000001": {"name": "Alpha", "purchase_fee_percent": 0.15}, "000002": {}}"#;
        let terms = CsvPriceProvider::parse_terms(json).unwrap();
        assert_eq!(terms["000001"].name.as_deref(), Some("Alpha"));
        assert_eq!(terms["000002"].dividend_mode, DividendMode::Cash);
        assert!(terms["000002"].purchase_fee_percent.is_none());
    }

    #[tokio::test]
    async fn test_load_instrument_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("000001.csv"),
            "date,netvalue,comment\n2021-01-04,1.00,\n2021-01-05,1.02,\n2021-01-06,1.03,\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"000001": {"name": "Alpha", "redemption_fees": ["小于7天", "1.50%", "大于等于7天", "0.00%"], "dividend_mode": "reinvest"}}"#,
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path())
            .with_horizon(NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
        let instrument = provider
            .instrument(&InstrumentCode::new("000001"))
            .await
            .unwrap();
        assert_eq!(instrument.name, "Alpha");
        assert_eq!(instrument.dividend_mode, DividendMode::Reinvest);
        assert_eq!(instrument.prices.rows().len(), 2);
        assert_eq!(instrument.fee_schedule.resolve(3), d("1.5"));
        assert_eq!(instrument.fee_schedule.resolve(30), Decimal::zero());
    }

    #[tokio::test]
    async fn test_missing_price_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let provider = CsvPriceProvider::new(dir.path());
        let err = provider
            .instrument(&InstrumentCode::new("999999"))
            .await
            .unwrap_err();
        assert_eq!(err, DataSourceError::NotFound("999999".to_string()));
    }
}
