//! Recorded trading actions for one instrument, and the legacy quantity encoding.
//!
//! A record is a signed number per date. Positive is a purchase amount in
//! currency, negative is a redemption in shares, and values in `[-0.005, 0)`
//! redeem a ratio of the current holding (`-0.005` is 100%). Fee overrides
//! ride in the sub-cent digits of the amount; [`TradeAction::decode`] is the
//! only place that knows about that.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{Decimal, InstrumentCode};

/// One `(date, signed_quantity)` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: NaiveDate,
    pub quantity: Decimal,
}

impl LedgerEntry {
    pub fn new(date: NaiveDate, quantity: Decimal) -> Self {
        Self { date, quantity }
    }
}

/// Immutable, date-ordered transaction records of one instrument.
///
/// Zero quantities carry no instruction and are dropped on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionLedger {
    code: InstrumentCode,
    entries: BTreeMap<NaiveDate, Decimal>,
}

impl TransactionLedger {
    pub fn new(code: InstrumentCode, entries: Vec<LedgerEntry>) -> Self {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.quantity.is_zero() {
                continue;
            }
            if let Some(previous) = map.insert(entry.date, entry.quantity) {
                warn!(
                    "{}: duplicate record on {}, {} replaced by {}",
                    code, entry.date, previous, entry.quantity
                );
            }
        }
        Self { code, entries: map }
    }

    pub fn code(&self) -> &InstrumentCode {
        &self.code
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = LedgerEntry> + '_ {
        self.entries
            .iter()
            .map(|(date, quantity)| LedgerEntry::new(*date, *quantity))
    }

    pub fn first(&self) -> Option<LedgerEntry> {
        self.entries().next()
    }

    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        self.entries.get(&date).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    /// Records dated within `from..=to`, oldest first.
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> Vec<LedgerEntry> {
        if to < from {
            return Vec::new();
        }
        self.entries
            .range(from..=to)
            .map(|(date, quantity)| LedgerEntry::new(*date, *quantity))
            .collect()
    }

    /// Stable fingerprint of every record dated on or before `through`.
    ///
    /// A stored reconstruction prefix is only reusable while this is unchanged.
    pub fn digest_through(&self, through: NaiveDate) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.code.as_str());
        for (date, quantity) in self.entries.range(..=through) {
            hasher.update(date.format("%Y-%m-%d").to_string());
            hasher.update(b"=");
            hasher.update(quantity.to_canonical_string());
            hasher.update(b";");
        }
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

/// A decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    /// Buy for `amount` currency units. `fee_percent` replaces the purchase fee.
    Purchase {
        amount: Decimal,
        fee_percent: Option<Decimal>,
    },
    /// Redeem `shares`. `fee_percent` replaces the holding-duration fee.
    Redeem {
        shares: Decimal,
        fee_percent: Option<Decimal>,
    },
    /// Redeem this fraction of the current holding.
    RedeemRatio { ratio: Decimal },
    Hold,
}

impl TradeAction {
    /// Decode a signed record quantity.
    ///
    /// Compatibility shim for recorded ledgers: when the sub-cent part of the
    /// magnitude is `0.005..0.006`, the amount is `0.005 + fee/10000` above
    /// whole cents and carries a fee override of `fee` percent (`10000.00515`
    /// buys 10000 at 1.5%). A sub-cent part within 1e-4 of exactly `0.005`
    /// decodes as a 0% override. Lossy; kept for existing records only.
    pub fn decode(quantity: Decimal) -> Self {
        let ratio_sentinel = Decimal::from_parts(5, 3);

        if quantity.is_zero() {
            TradeAction::Hold
        } else if quantity.is_positive() {
            let (amount, fee_percent) = split_fee_cents(quantity);
            TradeAction::Purchase {
                amount,
                fee_percent,
            }
        } else if quantity < -ratio_sentinel {
            let (shares, fee_percent) = split_fee_cents(quantity.abs());
            TradeAction::Redeem {
                shares,
                fee_percent,
            }
        } else {
            TradeAction::RedeemRatio {
                ratio: quantity.abs() / ratio_sentinel,
            }
        }
    }
}

/// Separate whole cents from a fee encoded in the sub-cent digits.
fn split_fee_cents(magnitude: Decimal) -> (Decimal, Option<Decimal>) {
    let epsilon = Decimal::from_parts(1, 6);
    let half = Decimal::from_parts(5, 1);
    let hundred = Decimal::hundred();

    let scaled = magnitude * hundred;
    let cents = (scaled + epsilon).trunc();
    let fraction = scaled - cents;
    let amount = cents / hundred;

    let tenths = (fraction * Decimal::from_i64(10) + epsilon).trunc();
    if tenths != Decimal::from_i64(5) {
        return (amount, None);
    }
    let excess = fraction - half;
    let fee_percent = if excess.abs() < Decimal::from_parts(1, 4) {
        Decimal::zero()
    } else {
        excess * hundred
    };
    (amount, Some(fee_percent))
}

/// On a dividend date, a purchase record ending in `.05` of a tenth flips the
/// dividend settlement for that event. Returns the record with the mark
/// removed and whether the mark was present.
pub fn strip_dividend_mark(quantity: Decimal) -> (Decimal, bool) {
    if !quantity.is_positive() {
        return (quantity, false);
    }
    let mark = Decimal::from_parts(5, 2);
    let tenths = quantity * Decimal::from_i64(10);
    let fraction = (tenths - tenths.trunc()).round_half_up(1);
    if fraction == Decimal::from_parts(5, 1) {
        (quantity - mark, true)
    } else {
        (quantity, false)
    }
}
