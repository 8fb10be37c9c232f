//! Purchase lots ("rem" table entries) and the FIFO lot ledger.
//!
//! Every operation returns a new ledger; a ledger held by a lot-table row is
//! never mutated after the row is committed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::Decimal;

/// A dated block of shares, tracked for holding-duration fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub date: NaiveDate,
    pub shares: Decimal,
}

impl Lot {
    pub fn new(date: NaiveDate, shares: Decimal) -> Self {
        Self { date, shares }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LotError {
    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares {
        requested: Decimal,
        available: Decimal,
    },
}

/// Lots ordered by purchase date, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotLedger {
    lots: Vec<Lot>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self { lots: Vec::new() }
    }

    /// Build a ledger from lots in any order; equal dates keep their relative order.
    pub fn from_lots(mut lots: Vec<Lot>) -> Self {
        lots.sort_by_key(|lot| lot.date);
        Self { lots }
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.shares).sum()
    }

    /// Add a lot bought on `date`. Zero shares leave the ledger unchanged.
    pub fn buy(&self, shares: Decimal, date: NaiveDate) -> Self {
        let mut next = self.clone();
        if shares.is_zero() {
            return next;
        }
        let at = next.lots.partition_point(|lot| lot.date <= date);
        next.lots.insert(at, Lot::new(date, shares));
        next
    }

    /// Consume `shares` oldest-first.
    ///
    /// Returns the consumed `(lot_date, shares_taken)` pieces and the remaining ledger.
    /// The caller clamps the request to [`LotLedger::total`] beforehand.
    pub fn sell(&self, shares: Decimal) -> Result<(Vec<Lot>, Self), LotError> {
        let available = self.total();
        if shares > available {
            return Err(LotError::InsufficientShares {
                requested: shares,
                available,
            });
        }

        let mut consumed = Vec::new();
        let mut remaining = Vec::with_capacity(self.lots.len());
        let mut left = shares;

        for lot in &self.lots {
            if !left.is_positive() {
                remaining.push(lot.clone());
                continue;
            }
            if lot.shares <= left {
                consumed.push(lot.clone());
                left = left - lot.shares;
            } else {
                consumed.push(Lot::new(lot.date, left));
                remaining.push(Lot::new(lot.date, lot.shares - left));
                left = Decimal::zero();
            }
        }

        Ok((consumed, Self { lots: remaining }))
    }

    /// Multiply every lot by `factor` (split or conversion on `date`).
    ///
    /// Purchase dates are preserved so the fee clock does not restart.
    pub fn scale(&self, factor: Decimal, date: NaiveDate) -> Self {
        debug!(%date, %factor, lots = self.lots.len(), "Scaling lots");
        Self {
            lots: self
                .lots
                .iter()
                .map(|lot| Lot::new(lot.date, (lot.shares * factor).round_cents()))
                .collect(),
        }
    }

    /// Identity copy, used when an event changes value but not shares.
    pub fn copy(&self) -> Self {
        self.clone()
    }
}
