//! Daily NAV series over trading days, with corporate actions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Decimal;

/// Corporate action carried by a price row's comment.
///
/// The raw comment is a signed number: negative is a split/conversion whose
/// share multiplier is `-comment`, positive is a dividend per share.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorporateAction {
    #[default]
    None,
    Split { factor: Decimal },
    Dividend { per_share: Decimal },
    /// Comment the upstream feed emitted that is not a number.
    Unrecognized { comment: String },
}

impl CorporateAction {
    pub fn from_value(value: Decimal) -> Self {
        if value.is_zero() {
            CorporateAction::None
        } else if value.is_negative() {
            CorporateAction::Split { factor: -value }
        } else {
            CorporateAction::Dividend { per_share: value }
        }
    }

    pub fn from_comment(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CorporateAction::None;
        }
        match Decimal::from_str_canonical(trimmed) {
            Ok(value) => Self::from_value(value),
            Err(_) => CorporateAction::Unrecognized {
                comment: trimmed.to_string(),
            },
        }
    }

    pub fn is_special(&self) -> bool {
        !matches!(self, CorporateAction::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub nav: Decimal,
    #[serde(default)]
    pub action: CorporateAction,
}

impl PriceRow {
    pub fn new(date: NaiveDate, nav: Decimal) -> Self {
        Self {
            date,
            nav,
            action: CorporateAction::None,
        }
    }

    pub fn with_action(mut self, action: CorporateAction) -> Self {
        self.action = action;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceSeriesError {
    #[error("price rows out of order: {date} follows {previous}")]
    Unordered {
        previous: NaiveDate,
        date: NaiveDate,
    },
    #[error("non-positive net asset value on {0}")]
    NonPositiveNav(NaiveDate),
}

/// Strictly date-ordered NAV rows; every row date is a trading day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceSeries {
    rows: Vec<PriceRow>,
}

impl PriceSeries {
    pub fn new(rows: Vec<PriceRow>) -> Result<Self, PriceSeriesError> {
        for pair in rows.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(PriceSeriesError::Unordered {
                    previous: pair[0].date,
                    date: pair[1].date,
                });
            }
        }
        if let Some(row) = rows.iter().find(|row| !row.nav.is_positive()) {
            return Err(PriceSeriesError::NonPositiveNav(row.date));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|row| row.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|row| row.date)
    }

    /// Drop rows after `horizon`; the series never reaches today or the future.
    pub fn through(&self, horizon: NaiveDate) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .take_while(|row| row.date <= horizon)
                .cloned()
                .collect(),
        }
    }

    pub fn row(&self, date: NaiveDate) -> Option<&PriceRow> {
        self.rows
            .binary_search_by_key(&date, |row| row.date)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.row(date).is_some()
    }

    /// The trading day a request on `date` executes on: `date` itself when
    /// open, else the next open day, else the last open day before it.
    pub fn snap(&self, date: NaiveDate) -> Option<&PriceRow> {
        let i = self.rows.partition_point(|row| row.date < date);
        self.rows.get(i).or_else(|| self.rows.last())
    }

    /// Last trading day on or before `date`.
    pub fn on_or_before(&self, date: NaiveDate) -> Option<&PriceRow> {
        let i = self.rows.partition_point(|row| row.date <= date);
        i.checked_sub(1).map(|i| &self.rows[i])
    }

    /// NAV of the last trading day on or before `date`.
    pub fn nav_on_or_before(&self, date: NaiveDate) -> Option<Decimal> {
        self.on_or_before(date).map(|row| row.nav)
    }

    /// Corporate action on `date`, if that day is special.
    pub fn action_on(&self, date: NaiveDate) -> Option<&CorporateAction> {
        self.row(date)
            .map(|row| &row.action)
            .filter(|action| action.is_special())
    }

    pub fn is_special(&self, date: NaiveDate) -> bool {
        self.action_on(date).is_some()
    }

    pub fn is_dividend_date(&self, date: NaiveDate) -> bool {
        matches!(self.action_on(date), Some(CorporateAction::Dividend { .. }))
    }

    pub fn is_split_date(&self, date: NaiveDate) -> bool {
        matches!(self.action_on(date), Some(CorporateAction::Split { .. }))
    }

    pub fn special_dates(&self) -> Vec<NaiveDate> {
        self.dates_where(|action| action.is_special())
    }

    pub fn dividend_dates(&self) -> Vec<NaiveDate> {
        self.dates_where(|action| matches!(action, CorporateAction::Dividend { .. }))
    }

    pub fn split_dates(&self) -> Vec<NaiveDate> {
        self.dates_where(|action| matches!(action, CorporateAction::Split { .. }))
    }

    fn dates_where(&self, pred: impl Fn(&CorporateAction) -> bool) -> Vec<NaiveDate> {
        self.rows
            .iter()
            .filter(|row| pred(&row.action))
            .map(|row| row.date)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 8, n).unwrap()
    }

    fn series() -> PriceSeries {
        PriceSeries::new(vec![
            PriceRow::new(day(1), d("1.00")),
            PriceRow::new(day(2), d("1.01")).with_action(CorporateAction::from_value(d("0.02"))),
            PriceRow::new(day(5), d("1.03")),
            PriceRow::new(day(8), d("0.52")).with_action(CorporateAction::from_value(d("-2"))),
        ])
        .unwrap()
    }

    #[test]
    fn test_comment_parsing() {
        assert_eq!(CorporateAction::from_comment("0"), CorporateAction::None);
        assert_eq!(CorporateAction::from_comment(""), CorporateAction::None);
        assert_eq!(
            CorporateAction::from_comment("-1.0234"),
            CorporateAction::Split { factor: d("1.0234") }
        );
        assert_eq!(
            CorporateAction::from_comment("0.05"),
            CorporateAction::Dividend { per_share: d("0.05") }
        );
        assert_eq!(
            CorporateAction::from_comment("bonus shares"),
            CorporateAction::Unrecognized {
                comment: "bonus shares".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_unordered_rows() {
        let err = PriceSeries::new(vec![
            PriceRow::new(day(2), d("1")),
            PriceRow::new(day(2), d("1")),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PriceSeriesError::Unordered {
                previous: day(2),
                date: day(2)
            }
        );
    }

    #[test]
    fn test_rejects_non_positive_nav() {
        assert_eq!(
            PriceSeries::new(vec![PriceRow::new(day(2), d("0"))]).unwrap_err(),
            PriceSeriesError::NonPositiveNav(day(2))
        );
    }

    #[test]
    fn test_snap_forward_then_backward() {
        let s = series();
        assert_eq!(s.snap(day(1)).unwrap().date, day(1));
        assert_eq!(s.snap(day(3)).unwrap().date, day(5));
        assert_eq!(s.snap(day(20)).unwrap().date, day(8));
        assert!(PriceSeries::default().snap(day(1)).is_none());
    }

    #[test]
    fn test_nav_on_or_before() {
        let s = series();
        assert_eq!(s.nav_on_or_before(day(4)), Some(d("1.01")));
        assert_eq!(s.nav_on_or_before(day(5)), Some(d("1.03")));
        assert_eq!(
            s.nav_on_or_before(NaiveDate::from_ymd_opt(2022, 7, 31).unwrap()),
            None
        );
    }

    #[test]
    fn test_special_date_sets() {
        let s = series();
        assert_eq!(s.special_dates(), vec![day(2), day(8)]);
        assert_eq!(s.dividend_dates(), vec![day(2)]);
        assert_eq!(s.split_dates(), vec![day(8)]);
        assert!(s.is_dividend_date(day(2)));
        assert!(s.is_split_date(day(8)));
        assert!(!s.is_special(day(5)));
    }

    #[test]
    fn test_through_horizon() {
        let s = series().through(day(5));
        assert_eq!(s.last_date(), Some(day(5)));
        assert_eq!(s.rows().len(), 3);
    }
}
