//! Trade records in the wide "status" layout: one `date` column, one column per fund.

use crate::domain::{parse_date, Decimal, InstrumentCode, LedgerEntry, TransactionLedger};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("record file has no date column")]
    MissingDateColumn,
    #[error("invalid date {value:?} on line {line}")]
    InvalidDate { line: u64, value: String },
    #[error("invalid quantity {value:?} for {code} on line {line}")]
    InvalidQuantity {
        line: u64,
        code: String,
        value: String,
    },
}

/// Transaction ledgers of every fund in a record file.
#[derive(Debug, Clone, Default)]
pub struct RecordBook {
    ledgers: BTreeMap<InstrumentCode, TransactionLedger>,
}

impl RecordBook {
    pub fn new(ledgers: Vec<TransactionLedger>) -> Self {
        Self {
            ledgers: ledgers
                .into_iter()
                .map(|ledger| (ledger.code().clone(), ledger))
                .collect(),
        }
    }

    /// Read the wide layout. Blank cells are zero; all-numeric codes shorter
    /// than six digits are zero-padded (spreadsheets drop leading zeros).
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, RecordError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let date_column = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("date"))
            .ok_or(RecordError::MissingDateColumn)?;
        let codes: Vec<(usize, InstrumentCode)> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != date_column && !h.is_empty())
            .map(|(i, h)| (i, normalize_code(h)))
            .collect();

        let mut entries: BTreeMap<InstrumentCode, Vec<LedgerEntry>> = codes
            .iter()
            .map(|(_, code)| (code.clone(), Vec::new()))
            .collect();

        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let raw_date = record.get(date_column).unwrap_or_default();
            if raw_date.is_empty() {
                continue;
            }
            let date = parse_date(raw_date).map_err(|_| RecordError::InvalidDate {
                line,
                value: raw_date.to_string(),
            })?;

            for (column, code) in &codes {
                let cell = record.get(*column).unwrap_or_default();
                if cell.is_empty() {
                    continue;
                }
                let quantity =
                    Decimal::from_str_canonical(cell).map_err(|_| RecordError::InvalidQuantity {
                        line,
                        code: code.to_string(),
                        value: cell.to_string(),
                    })?;
                if let Some(list) = entries.get_mut(code) {
                    list.push(LedgerEntry::new(date, quantity));
                }
            }
        }

        let ledgers = entries
            .into_iter()
            .map(|(code, list)| TransactionLedger::new(code, list))
            .collect::<Vec<_>>();
        debug!(funds = ledgers.len(), "Loaded record book");
        Ok(Self::new(ledgers))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::from_csv_reader(bytes.as_slice())
    }

    pub fn codes(&self) -> impl Iterator<Item = &InstrumentCode> {
        self.ledgers.keys()
    }

    pub fn ledger(&self, code: &InstrumentCode) -> Option<&TransactionLedger> {
        self.ledgers.get(code)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &TransactionLedger> {
        self.ledgers.values()
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}

fn normalize_code(header: &str) -> InstrumentCode {
    if !header.is_empty() && header.len() < 6 && header.chars().all(|c| c.is_ascii_digit()) {
        InstrumentCode::new(format!("{:0>6}", header))
    } else {
        InstrumentCode::new(header)
    }
}
