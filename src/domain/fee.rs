//! Redemption fee schedules, piecewise by holding duration.
//!
//! Fund sites publish the schedule as alternating label / percentage cells,
//! e.g. `["< 7 days", "1.50%", ">= 7 days", "0.00%"]`. Labels carry one or
//! two duration thresholds in days, months, half-years or years.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::Decimal;

const DAYS_PER_MONTH: u32 = 30;
const DAYS_PER_HALF_YEAR: u32 = 183;
const DAYS_PER_YEAR: u32 = 365;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeScheduleError {
    #[error("fee table is empty")]
    Empty,
    #[error("fee table must alternate label and percentage, got {0} cells")]
    OddLength(usize),
    #[error("unrecognized holding duration label: {0}")]
    UnrecognizedLabel(String),
    #[error("invalid fee percentage: {0}")]
    InvalidPercent(String),
}

/// One holding-duration bracket: `lower_days <= held < upper_days`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSegment {
    pub lower_days: u32,
    /// None for the open-ended last bracket.
    pub upper_days: Option<u32>,
    /// Fee in percent, `1.5` means 1.5%.
    pub percent: Decimal,
}

impl FeeSegment {
    fn contains(&self, days: i64) -> bool {
        days >= i64::from(self.lower_days)
            && self.upper_days.map_or(true, |upper| days < i64::from(upper))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    segments: Vec<FeeSegment>,
}

impl FeeSchedule {
    /// Schedule substituted when the published table cannot be used:
    /// under 7 days 1.5%, afterwards free.
    pub fn default_schedule() -> Self {
        Self {
            segments: vec![
                FeeSegment {
                    lower_days: 0,
                    upper_days: Some(7),
                    percent: Decimal::from_parts(15, 1),
                },
                FeeSegment {
                    lower_days: 7,
                    upper_days: None,
                    percent: Decimal::zero(),
                },
            ],
        }
    }

    /// A schedule that never charges a redemption fee.
    pub fn free() -> Self {
        Self {
            segments: vec![FeeSegment {
                lower_days: 0,
                upper_days: None,
                percent: Decimal::zero(),
            }],
        }
    }

    pub fn from_segments(segments: Vec<FeeSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[FeeSegment] {
        &self.segments
    }

    /// Parse alternating label / percentage cells.
    ///
    /// Boundary mismatches between neighbouring brackets are logged and kept;
    /// an off-by-one (`upper + 1 == next lower`) is corrected silently.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, FeeScheduleError> {
        if raw.is_empty() {
            return Err(FeeScheduleError::Empty);
        }
        if raw.len() % 2 != 0 {
            return Err(FeeScheduleError::OddLength(raw.len()));
        }

        let mut segments = Vec::with_capacity(raw.len() / 2);
        for (i, pair) in raw.chunks(2).enumerate() {
            let label = pair[0].as_ref();
            let thresholds = parse_thresholds(label)?;
            let percent = parse_percent(pair[1].as_ref())?;

            let (lower_days, upper_days) = match (i, thresholds.as_slice()) {
                (0, [upper]) => (0, Some(*upper)),
                (0, [_, upper]) => (0, Some(*upper)),
                (_, [lower]) => (*lower, None),
                (_, [lower, upper]) => (*lower, Some(*upper)),
                _ => return Err(FeeScheduleError::UnrecognizedLabel(label.to_string())),
            };
            segments.push(FeeSegment {
                lower_days,
                upper_days,
                percent,
            });
        }

        for i in 0..segments.len().saturating_sub(1) {
            let next_lower = segments[i + 1].lower_days;
            match segments[i].upper_days {
                Some(upper) if upper == next_lower => {}
                Some(upper) if upper + 1 == next_lower => {
                    segments[i].upper_days = Some(next_lower);
                }
                other => {
                    warn!(
                        "Inconsistent redemption fee brackets: bracket {} ends at {:?} but bracket {} starts at {}",
                        i,
                        other,
                        i + 1,
                        next_lower
                    );
                    if other.is_none() {
                        segments[i].upper_days = Some(next_lower);
                    }
                }
            }
        }

        Ok(Self { segments })
    }

    /// Parse, falling back to [`FeeSchedule::default_schedule`] when the table
    /// is unusable.
    pub fn parse_or_default<S: AsRef<str>>(raw: &[S]) -> Self {
        match Self::parse(raw) {
            Ok(schedule) => schedule,
            Err(err) => {
                let cells: Vec<&str> = raw.iter().map(|s| s.as_ref()).collect();
                warn!(
                    "Redemption fee table {:?} unusable ({}), using default schedule",
                    cells, err
                );
                Self::default_schedule()
            }
        }
    }

    /// Fee in percent for shares held `days_held` days.
    pub fn resolve(&self, days_held: i64) -> Decimal {
        self.segments
            .iter()
            .find(|seg| seg.contains(days_held))
            .map(|seg| seg.percent)
            .unwrap_or_else(Decimal::zero)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::default_schedule()
    }
}

fn parse_percent(cell: &str) -> Result<Decimal, FeeScheduleError> {
    let trimmed = cell.trim().trim_end_matches('%').trim();
    Decimal::from_str_canonical(trimmed)
        .map_err(|_| FeeScheduleError::InvalidPercent(cell.to_string()))
}

/// Pull every `<number><unit>` duration (and "half year") out of a label, in days.
fn parse_thresholds(label: &str) -> Result<Vec<u32>, FeeScheduleError> {
    let unrecognized = || FeeScheduleError::UnrecognizedLabel(label.to_string());
    let chars: Vec<char> = label.to_lowercase().chars().collect();
    let mut thresholds = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()));

        if starts_number {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let mut number: String = chars[start..i].iter().collect();
            if number.starts_with('.') {
                number.insert(0, '0');
            }
            let value = Decimal::from_str_canonical(&number).map_err(|_| unrecognized())?;

            while i < chars.len() && (chars[i].is_whitespace() || chars[i] == '个') {
                i += 1;
            }
            let (unit, next) = read_unit(&chars, i);
            i = next;
            thresholds.push(to_days(value, &unit).ok_or_else(unrecognized)?);
        } else if c.is_ascii_alphabetic() {
            let (word, next) = read_unit(&chars, i);
            i = next;
            if word == "half" {
                let mut j = i;
                while j < chars.len() && (chars[j].is_whitespace() || chars[j] == '-') {
                    j += 1;
                }
                let (mut unit, mut after) = read_unit(&chars, j);
                if unit == "a" {
                    while after < chars.len() && chars[after].is_whitespace() {
                        after += 1;
                    }
                    (unit, after) = read_unit(&chars, after);
                }
                if unit == "year" || unit == "years" {
                    thresholds.push(DAYS_PER_HALF_YEAR);
                    i = after;
                }
            }
        } else {
            i += 1;
        }
    }

    if thresholds.is_empty() {
        return Err(unrecognized());
    }
    Ok(thresholds)
}

/// Read an ASCII word or a single CJK unit character starting at `i`.
fn read_unit(chars: &[char], i: usize) -> (String, usize) {
    match chars.get(i) {
        Some(c) if c.is_ascii_alphabetic() => {
            let mut end = i;
            while end < chars.len() && chars[end].is_ascii_alphabetic() {
                end += 1;
            }
            (chars[i..end].iter().collect(), end)
        }
        Some(c) if matches!(c, '天' | '日' | '月' | '年') => (c.to_string(), i + 1),
        _ => (String::new(), i),
    }
}

fn to_days(value: Decimal, unit: &str) -> Option<u32> {
    let days = match unit {
        "d" | "day" | "days" | "天" | "日" => value.trunc(),
        "m" | "mo" | "month" | "months" | "月" => {
            value.trunc() * Decimal::from_i64(i64::from(DAYS_PER_MONTH))
        }
        "y" | "yr" | "year" | "years" | "年" => {
            if value == Decimal::from_parts(5, 1) {
                Decimal::from_i64(i64::from(DAYS_PER_HALF_YEAR))
            } else {
                (value * Decimal::from_i64(i64::from(DAYS_PER_YEAR))).trunc()
            }
        }
        _ => return None,
    };
    days.to_canonical_string().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_two_bracket_schedule() {
        let schedule = FeeSchedule::parse(&["< 7 days", "1.50%", ">= 7 days", "0.00%"]).unwrap();
        assert_eq!(schedule, FeeSchedule::default_schedule());
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_thresholds("less than 6 months").unwrap(), vec![180]);
        assert_eq!(parse_thresholds(">= 1 year").unwrap(), vec![365]);
        assert_eq!(parse_thresholds("1.5 years").unwrap(), vec![547]);
        assert_eq!(parse_thresholds("half a year").unwrap(), vec![183]);
        assert_eq!(parse_thresholds(".5年").unwrap(), vec![183]);
        assert_eq!(parse_thresholds("大于等于7天，小于6个月").unwrap(), vec![7, 180]);
        assert_eq!(parse_thresholds("7d to 2y").unwrap(), vec![7, 730]);
    }

    #[test]
    fn test_unknown_label_rejected() {
        assert!(matches!(
            FeeSchedule::parse(&["forever", "0.00%"]),
            Err(FeeScheduleError::UnrecognizedLabel(_))
        ));
        assert!(matches!(
            FeeSchedule::parse(&["7 fortnights", "0.00%"]),
            Err(FeeScheduleError::UnrecognizedLabel(_))
        ));
    }

    #[test]
    fn test_odd_length_rejected() {
        assert_eq!(
            FeeSchedule::parse(&["< 7 days", "1.50%", ">= 7 days"]),
            Err(FeeScheduleError::OddLength(3))
        );
    }

    #[test]
    fn test_invalid_percent_rejected() {
        assert!(matches!(
            FeeSchedule::parse(&["< 7 days", "n/a"]),
            Err(FeeScheduleError::InvalidPercent(_))
        ));
    }

    #[test]
    fn test_off_by_one_boundary_corrected() {
        let schedule = FeeSchedule::parse(&[
            "< 7 days",
            "1.50%",
            ">= 7 days, <= 364 days",
            "0.50%",
            ">= 365 days",
            "0%",
        ])
        .unwrap();
        assert_eq!(schedule.segments()[1].upper_days, Some(365));
        assert_eq!(schedule.resolve(364), d("0.5"));
        assert_eq!(schedule.resolve(365), d("0"));
    }

    #[test]
    fn test_other_mismatch_is_kept() {
        let schedule =
            FeeSchedule::parse(&["< 7 days", "1.5%", ">= 30 days", "0%"]).unwrap();
        assert_eq!(schedule.segments()[0].upper_days, Some(7));
        assert_eq!(schedule.segments()[1].lower_days, 30);
        // the gap resolves to the zero fallback
        assert_eq!(schedule.resolve(10), Decimal::zero());
    }

    #[test]
    fn test_parse_or_default_falls_back() {
        let schedule = FeeSchedule::parse_or_default(&["closed period", "---"]);
        assert_eq!(schedule, FeeSchedule::default_schedule());
    }

    #[test]
    fn test_resolve_first_bracket_starts_at_zero() {
        let schedule = FeeSchedule::parse(&["7 days to 30 days", "0.75%", "> 30 days", "0%"]).unwrap();
        assert_eq!(schedule.segments()[0].lower_days, 0);
        assert_eq!(schedule.resolve(0), d("0.75"));
    }

    #[test]
    fn test_free_schedule() {
        assert_eq!(FeeSchedule::free().resolve(0), Decimal::zero());
        assert_eq!(FeeSchedule::free().resolve(10_000), Decimal::zero());
    }
}
