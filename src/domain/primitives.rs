//! Domain primitives: InstrumentCode, DividendMode, ShareRounding, date parsing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::Decimal;

/// Fund/instrument code (e.g. "110011"). Leading zeros are significant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentCode(pub String);

impl InstrumentCode {
    pub fn new(code: impl Into<String>) -> Self {
        InstrumentCode(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a cash dividend is settled for the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividendMode {
    /// Dividend is paid out as cash.
    #[default]
    Cash,
    /// Dividend buys new shares at the ex-date NAV.
    Reinvest,
}

impl DividendMode {
    pub fn toggled(self) -> Self {
        match self {
            DividendMode::Cash => DividendMode::Reinvest,
            DividendMode::Reinvest => DividendMode::Cash,
        }
    }
}

/// Rounding applied to shares obtained from a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRounding {
    #[default]
    HalfUp,
    /// Some funds drop fractional shares beyond two decimals.
    Down,
}

impl ShareRounding {
    pub fn apply(self, shares: Decimal) -> Decimal {
        match self {
            ShareRounding::HalfUp => shares.round_cents(),
            ShareRounding::Down => shares.round_cents_down(),
        }
    }
}

/// Parse `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`.
pub fn parse_date(input: &str) -> Result<NaiveDate, chrono::ParseError> {
    let compact: String = input
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != '/')
        .collect();
    NaiveDate::parse_from_str(&compact, "%Y%m%d")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 3, 9).unwrap();
        assert_eq!(parse_date("2020-03-09").unwrap(), expected);
        assert_eq!(parse_date("20200309").unwrap(), expected);
        assert_eq!(parse_date("2020/03/09").unwrap(), expected);
        assert!(parse_date("2020-13-01").is_err());
    }

    #[test]
    fn test_dividend_mode_toggle() {
        assert_eq!(DividendMode::Cash.toggled(), DividendMode::Reinvest);
        assert_eq!(DividendMode::Reinvest.toggled(), DividendMode::Cash);
    }

    #[test]
    fn test_share_rounding() {
        let shares = Decimal::from_str_canonical("100.456").unwrap();
        assert_eq!(
            ShareRounding::HalfUp.apply(shares),
            Decimal::from_str_canonical("100.46").unwrap()
        );
        assert_eq!(
            ShareRounding::Down.apply(shares),
            Decimal::from_str_canonical("100.45").unwrap()
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&DividendMode::Reinvest).unwrap(),
            "\"reinvest\""
        );
        assert_eq!(
            serde_json::to_string(&ShareRounding::HalfUp).unwrap(),
            "\"half_up\""
        );
    }

    #[test]
    fn test_instrument_code_display() {
        assert_eq!(InstrumentCode::new("001234").to_string(), "001234");
    }
}
