//! Incremental compilation of stored reconstruction tables.
//!
//! This module provides:
//! - Watermark-based resumption of the trade engine from persisted rows
//! - Prefix digests that invalidate stored rows when their inputs change

use crate::domain::InstrumentCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod incremental;

pub use incremental::{prefix_digest, CompileError, CompileOutcome, Compiler};

/// Compile state tracking for watermark-based incremental processing.
///
/// Stored rows are reusable only while `prefix_digest` still matches the
/// inputs they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileState {
    pub code: InstrumentCode,
    /// Date of the last stored row.
    pub last_date: Option<NaiveDate>,
    /// Last calendar date whose records are reflected in the stored rows.
    pub processed_through: Option<NaiveDate>,
    pub prefix_digest: Option<String>,
    pub row_count: i64,
}

impl CompileState {
    pub fn new(code: InstrumentCode) -> Self {
        Self {
            code,
            last_date: None,
            processed_through: None,
            prefix_digest: None,
            row_count: 0,
        }
    }

    pub fn is_first_compilation(&self) -> bool {
        self.processed_through.is_none()
    }

    /// Advance the watermark after appending rows.
    pub fn update_watermark(
        &mut self,
        last_date: Option<NaiveDate>,
        processed_through: Option<NaiveDate>,
        prefix_digest: String,
        row_count: i64,
    ) {
        self.last_date = last_date;
        self.processed_through = processed_through;
        self.prefix_digest = Some(prefix_digest);
        self.row_count = row_count;
    }

    /// A stored prefix that ends on a row executed at an earlier trading day
    /// than its records must be recomputed once later prices exist.
    pub fn ends_on_backfilled_row(&self) -> bool {
        match (self.last_date, self.processed_through) {
            (Some(last), Some(through)) => last < through,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 5, n).unwrap()
    }

    #[test]
    fn test_compile_state_new() {
        let state = CompileState::new(InstrumentCode::new("000001"));
        assert!(state.is_first_compilation());
        assert_eq!(state.row_count, 0);
        assert!(state.prefix_digest.is_none());
    }

    #[test]
    fn test_compile_state_update_watermark() {
        let mut state = CompileState::new(InstrumentCode::new("000001"));
        state.update_watermark(Some(day(7)), Some(day(7)), "abc".to_string(), 4);
        assert!(!state.is_first_compilation());
        assert_eq!(state.row_count, 4);
        assert!(!state.ends_on_backfilled_row());

        state.update_watermark(Some(day(7)), Some(day(9)), "abd".to_string(), 5);
        assert!(state.ends_on_backfilled_row());
    }
}
