//! Reconstructed tables: cash flow per event day, and the lot ledger after it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Decimal, LotLedger};

/// Net effect of one event day. Cash is negative when money goes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashFlowRow {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub share: Decimal,
}

impl CashFlowRow {
    pub fn new(date: NaiveDate, cash: Decimal, share: Decimal) -> Self {
        Self { date, cash, share }
    }
}

/// Lots held at the end of an event day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotTableRow {
    pub date: NaiveDate,
    pub lots: LotLedger,
}

/// Append-only cash-flow table in non-decreasing date order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CashFlowTable {
    rows: Vec<CashFlowRow>,
}

impl CashFlowTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Rows must already be in date order; returns None otherwise.
    pub fn from_rows(rows: Vec<CashFlowRow>) -> Option<Self> {
        if rows.windows(2).any(|pair| pair[1].date < pair[0].date) {
            return None;
        }
        Some(Self { rows })
    }

    pub fn rows(&self) -> &[CashFlowRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&CashFlowRow> {
        self.rows.last()
    }

    pub(crate) fn push(&mut self, row: CashFlowRow) {
        self.rows.push(row);
    }

    /// Add `cash` and `share` to the last row. False when the table is empty.
    pub(crate) fn amend_last(&mut self, cash: Decimal, share: Decimal) -> bool {
        match self.rows.last_mut() {
            Some(row) => {
                row.cash += cash;
                row.share += share;
                true
            }
            None => false,
        }
    }

    /// Rows dated on or before `date`.
    pub fn through(&self, date: NaiveDate) -> &[CashFlowRow] {
        let end = self.rows.partition_point(|row| row.date <= date);
        &self.rows[..end]
    }

    pub fn total_shares(&self) -> Decimal {
        self.rows.iter().map(|row| row.share).sum()
    }

    pub fn shares_through(&self, date: NaiveDate) -> Decimal {
        self.through(date).iter().map(|row| row.share).sum()
    }
}

/// Lot snapshots aligned row-for-row with a [`CashFlowTable`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotTable {
    rows: Vec<LotTableRow>,
}

impl LotTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn from_rows(rows: Vec<LotTableRow>) -> Option<Self> {
        if rows.windows(2).any(|pair| pair[1].date < pair[0].date) {
            return None;
        }
        Some(Self { rows })
    }

    pub fn rows(&self) -> &[LotTableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn push(&mut self, row: LotTableRow) {
        self.rows.push(row);
    }

    pub(crate) fn replace_last(&mut self, lots: LotLedger) -> bool {
        match self.rows.last_mut() {
            Some(row) => {
                row.lots = lots;
                true
            }
            None => false,
        }
    }

    /// Ledger after the last event.
    pub fn current(&self) -> LotLedger {
        self.rows
            .last()
            .map(|row| row.lots.clone())
            .unwrap_or_default()
    }

    /// Ledger after the last event on or before `date`.
    pub fn as_of(&self, date: NaiveDate) -> LotLedger {
        let end = self.rows.partition_point(|row| row.date <= date);
        end.checked_sub(1)
            .map(|i| self.rows[i].lots.clone())
            .unwrap_or_default()
    }
}
