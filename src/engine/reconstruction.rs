//! Replays a transaction ledger against an instrument's price history.
//!
//! The engine emits one cash-flow row and one lot snapshot per event day.
//! An event day is a trading day on which a record executes or a corporate
//! action lands. Records dated on closed days execute on the next trading
//! day; records that reach the same trading day are applied in date order
//! inside a single row.

use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    CashFlowRow, CashFlowTable, CorporateAction, Decimal, DividendMode, Instrument,
    LedgerEntry, LotError, LotLedger, LotTable, LotTableRow, PriceRow, TradeAction,
    TransactionLedger,
};
use crate::domain::transaction::strip_dividend_mark;
use crate::engine::Trade;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The ledger asks for something the holding cannot do.
    #[error("trade behavior error: {0}")]
    TradeBehavior(String),
    /// A price row carries a comment that is not a number.
    #[error("parser failure: {0}")]
    ParserFailure(String),
    #[error(transparent)]
    Ledger(#[from] LotError),
    #[error("no price available for {code} near {date}")]
    MissingPrice { code: String, date: NaiveDate },
    #[error("invalid seed tables: {0}")]
    InvalidSeed(String),
}

/// Outcome of one [`TradeEngine::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A row dated on this trading day was appended.
    Appended(NaiveDate),
    /// Late records were folded into the existing row for this trading day.
    Amended(NaiveDate),
    /// No event remains on or before the horizon.
    Exhausted,
}

impl Step {
    /// Trading day touched by this step, if any.
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            Step::Appended(date) | Step::Amended(date) => Some(date),
            Step::Exhausted => None,
        }
    }
}

/// Result of redeeming shares against a lot ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    /// Cash received after fees.
    pub cash: Decimal,
    /// Shares actually sold (after clamping to the holding).
    pub shares: Decimal,
    pub remaining: LotLedger,
}

/// Accumulates the effect of one event day before it is committed.
#[derive(Debug)]
struct DayEffect {
    cash: Decimal,
    share: Decimal,
    lots: LotLedger,
}

impl DayEffect {
    fn starting_from(lots: LotLedger) -> Self {
        Self {
            cash: Decimal::zero(),
            share: Decimal::zero(),
            lots,
        }
    }
}

pub struct TradeEngine {
    instrument: Arc<Instrument>,
    ledger: TransactionLedger,
    horizon: NaiveDate,
    cashflow: CashFlowTable,
    lots: LotTable,
    /// Last calendar date already accounted for.
    processed_through: Option<NaiveDate>,
    /// Lowest existing row that late records were folded into.
    amended_from: Option<usize>,
}

impl TradeEngine {
    pub fn new(instrument: Arc<Instrument>, ledger: TransactionLedger, horizon: NaiveDate) -> Self {
        Self {
            instrument,
            ledger,
            horizon,
            cashflow: CashFlowTable::new(),
            lots: LotTable::new(),
            processed_through: None,
            amended_from: None,
        }
    }

    /// Continue from previously reconstructed tables.
    ///
    /// The tables must be row-aligned. Events after the last row are replayed
    /// exactly as a fresh run would.
    pub fn resume(
        instrument: Arc<Instrument>,
        ledger: TransactionLedger,
        cashflow: CashFlowTable,
        lots: LotTable,
        horizon: NaiveDate,
    ) -> Result<Self, EngineError> {
        if cashflow.len() != lots.len() {
            return Err(EngineError::InvalidSeed(format!(
                "{} cash-flow rows but {} lot rows",
                cashflow.len(),
                lots.len()
            )));
        }
        let misaligned = cashflow
            .rows()
            .iter()
            .zip(lots.rows())
            .find(|(cf, lot)| cf.date != lot.date);
        if let Some((cf, lot)) = misaligned {
            return Err(EngineError::InvalidSeed(format!(
                "cash-flow row {} paired with lot row {}",
                cf.date, lot.date
            )));
        }
        if cashflow.total_shares() != lots.current().total() {
            return Err(EngineError::InvalidSeed(format!(
                "cash-flow shares {} disagree with lot total {}",
                cashflow.total_shares(),
                lots.current().total()
            )));
        }

        let processed_through = cashflow.last().map(|row| row.date);
        Ok(Self {
            instrument,
            ledger,
            horizon,
            cashflow,
            lots,
            processed_through,
            amended_from: None,
        })
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn cashflow(&self) -> &CashFlowTable {
        &self.cashflow
    }

    pub fn lots(&self) -> &LotTable {
        &self.lots
    }

    /// Last calendar date whose records are reflected in the tables.
    ///
    /// Later than the last row's date when the final records executed at the
    /// last available price before them.
    pub fn processed_through(&self) -> Option<NaiveDate> {
        self.processed_through
    }

    /// Index of the first row rewritten in place rather than appended.
    ///
    /// Set when records dated after the last price fall back onto a trading
    /// day that already has a row.
    pub fn amended_from(&self) -> Option<usize> {
        self.amended_from
    }

    /// Mark records up to `date` as already applied to the seed tables.
    pub fn with_processed_through(mut self, date: NaiveDate) -> Self {
        self.processed_through = Some(self.processed_through.map_or(date, |d| d.max(date)));
        self
    }

    /// Append the next event day, if any remains on or before the horizon.
    pub fn advance(&mut self) -> Result<Step, EngineError> {
        match self.processed_through {
            None => self.open_position(),
            Some(last) => self.next_event(last),
        }
    }

    /// Advance until exhausted.
    pub fn run(mut self) -> Result<Trade, EngineError> {
        let start_rows = self.cashflow.len();
        while let Some(date) = self.advance()?.date() {
            debug!(code = %self.instrument.code, %date, "Applied event day");
        }
        info!(
            code = %self.instrument.code,
            rows = self.cashflow.len(),
            new_rows = self.cashflow.len() - start_rows,
            "Reconstruction complete"
        );
        Ok(self.into_trade())
    }

    pub fn into_trade(self) -> Trade {
        Trade::new(self.instrument, self.cashflow, self.lots)
    }

    /// First row: the earliest record, which must be a purchase.
    fn open_position(&mut self) -> Result<Step, EngineError> {
        let Some(first) = self.ledger.first() else {
            return Ok(Step::Exhausted);
        };
        if first.date > self.horizon {
            return Err(EngineError::TradeBehavior(format!(
                "{}: first record on {} is after the horizon {}",
                self.instrument.code, first.date, self.horizon
            )));
        }

        let row = self.execution_row(first.date)?;
        let window_end = first.date.max(row.date);
        let records = self.ledger.range(first.date, window_end);
        let mut effect = DayEffect::starting_from(LotLedger::new());

        for (i, entry) in records.iter().enumerate() {
            let action = TradeAction::decode(entry.quantity);
            if i == 0 && !matches!(action, TradeAction::Purchase { .. }) {
                return Err(EngineError::TradeBehavior(format!(
                    "{}: cannot redeem on {} before any purchase",
                    self.instrument.code, entry.date
                )));
            }
            self.apply_action(&mut effect, action, &row)?;
        }

        self.commit(row.date, window_end, effect);
        Ok(Step::Appended(row.date))
    }

    fn next_event(&mut self, last: NaiveDate) -> Result<Step, EngineError> {
        let prices = &self.instrument.prices;
        let mut cursor = match last.succ_opt() {
            Some(date) => date,
            None => return Ok(Step::Exhausted),
        };
        loop {
            if cursor > self.horizon {
                return Ok(Step::Exhausted);
            }
            if self.ledger.contains(cursor) || prices.is_special(cursor) {
                break;
            }
            cursor = match cursor.succ_opt() {
                Some(date) => date,
                None => return Ok(Step::Exhausted),
            };
        }

        let row = self.execution_row(cursor)?;
        if row.date < cursor {
            warn!(
                code = %self.instrument.code,
                requested = %cursor,
                executed = %row.date,
                "No trading day on or after request, using last available price"
            );
        }
        let window_end = cursor.max(row.date);
        let records = self.ledger.range(cursor, window_end);
        let mut effect = DayEffect::starting_from(self.lots.current());
        let day_committed = self.cashflow.last().is_some_and(|last| last.date == row.date);

        if !records.is_empty() {
            if prices.is_split_date(row.date) {
                for entry in &records {
                    warn!(
                        code = %self.instrument.code,
                        date = %entry.date,
                        quantity = %entry.quantity,
                        "Record executes on a split date and is ignored"
                    );
                }
            } else {
                self.apply_records(&mut effect, &records, &row)?;
            }
        }

        if day_committed {
            // The day's corporate action is already in its row.
            self.fold_into_last(window_end, effect);
            return Ok(Step::Amended(row.date));
        }

        let mut dividend_mode = self.instrument.dividend_mode;
        if prices.is_dividend_date(row.date) && !prices.is_split_date(row.date) {
            for entry in &records {
                if strip_dividend_mark(entry.quantity).1 {
                    dividend_mode = dividend_mode.toggled();
                }
            }
        }
        if row.action.is_special() {
            self.apply_corporate_action(&mut effect, &row, dividend_mode)?;
        }

        self.commit(row.date, window_end, effect);
        Ok(Step::Appended(row.date))
    }

    fn apply_records(
        &self,
        effect: &mut DayEffect,
        records: &[LedgerEntry],
        row: &PriceRow,
    ) -> Result<(), EngineError> {
        let dividend_day = self.instrument.prices.is_dividend_date(row.date);
        for entry in records {
            let quantity = if dividend_day {
                strip_dividend_mark(entry.quantity).0
            } else {
                entry.quantity
            };
            self.apply_action(effect, TradeAction::decode(quantity), row)?;
        }
        Ok(())
    }

    fn apply_action(
        &self,
        effect: &mut DayEffect,
        action: TradeAction,
        row: &PriceRow,
    ) -> Result<(), EngineError> {
        match action {
            TradeAction::Purchase {
                amount,
                fee_percent,
            } => {
                let (cash, shares) = settle_purchase(&self.instrument, amount, fee_percent, row);
                effect.lots = effect.lots.buy(shares, row.date);
                effect.cash = effect.cash + cash;
                effect.share = effect.share + shares;
            }
            TradeAction::Redeem {
                shares,
                fee_percent,
            } => {
                let redemption =
                    settle_redemption(&self.instrument, &effect.lots, shares, fee_percent, row)?;
                self.book_redemption(effect, redemption);
            }
            TradeAction::RedeemRatio { ratio } => {
                let shares = effect.lots.total() * ratio;
                let redemption = settle_redemption(
                    &self.instrument,
                    &effect.lots,
                    shares,
                    Some(Decimal::zero()),
                    row,
                )?;
                self.book_redemption(effect, redemption);
            }
            TradeAction::Hold => {}
        }
        Ok(())
    }

    fn book_redemption(&self, effect: &mut DayEffect, redemption: Redemption) {
        effect.cash = effect.cash + redemption.cash;
        effect.share = effect.share - redemption.shares;
        effect.lots = redemption.remaining;
    }

    fn apply_corporate_action(
        &self,
        effect: &mut DayEffect,
        row: &PriceRow,
        dividend_mode: DividendMode,
    ) -> Result<(), EngineError> {
        match &row.action {
            CorporateAction::None => {}
            CorporateAction::Split { factor } => {
                let before = effect.lots.total();
                effect.lots = effect.lots.scale(*factor, row.date);
                effect.share = effect.share + (effect.lots.total() - before);
            }
            CorporateAction::Dividend { per_share } => {
                let held = self.cashflow.total_shares();
                match dividend_mode {
                    DividendMode::Cash => {
                        effect.cash = effect.cash + (held * *per_share).round_cents();
                    }
                    DividendMode::Reinvest => {
                        let shares = (held * *per_share / row.nav).round_cents();
                        effect.lots = effect.lots.buy(shares, row.date);
                        effect.share = effect.share + shares;
                    }
                }
            }
            CorporateAction::Unrecognized { comment } => {
                return Err(EngineError::ParserFailure(format!(
                    "{}: unrecognized corporate action {:?} on {}",
                    self.instrument.code, comment, row.date
                )));
            }
        }
        Ok(())
    }

    /// Trading day a record on `date` executes on, never past the horizon.
    fn execution_row(&self, date: NaiveDate) -> Result<PriceRow, EngineError> {
        let prices = &self.instrument.prices;
        prices
            .snap(date)
            .filter(|row| row.date <= self.horizon)
            .or_else(|| prices.on_or_before(self.horizon.min(date)))
            .cloned()
            .ok_or_else(|| EngineError::MissingPrice {
                code: self.instrument.code.to_string(),
                date,
            })
    }

    fn commit(&mut self, date: NaiveDate, processed_through: NaiveDate, effect: DayEffect) {
        self.cashflow
            .push(CashFlowRow::new(date, effect.cash, effect.share));
        self.lots.push(LotTableRow {
            date,
            lots: effect.lots,
        });
        self.processed_through = Some(processed_through);
    }

    fn fold_into_last(&mut self, processed_through: NaiveDate, effect: DayEffect) {
        let index = self.cashflow.len().saturating_sub(1);
        if self.cashflow.amend_last(effect.cash, effect.share) {
            self.lots.replace_last(effect.lots);
            self.amended_from = Some(self.amended_from.map_or(index, |i| i.min(index)));
        }
        self.processed_through = Some(processed_through);
    }
}

/// Cash paid and shares received for a purchase of `amount`.
///
/// The fee is charged on top: `net = amount / (1 + fee%)`.
pub fn settle_purchase(
    instrument: &Instrument,
    amount: Decimal,
    fee_percent: Option<Decimal>,
    row: &PriceRow,
) -> (Decimal, Decimal) {
    let fee = fee_percent.unwrap_or(instrument.purchase_fee_percent);
    let net = (amount / (Decimal::one() + fee / Decimal::hundred())).round_cents();
    let shares = instrument.share_rounding.apply(net / row.nav);
    (-amount.round_cents(), shares)
}

/// Sell `requested` shares oldest-first at `row`'s NAV.
///
/// Requests above the holding are clamped. Each consumed lot pays the fee
/// for its own holding duration unless `fee_percent` overrides it.
pub fn settle_redemption(
    instrument: &Instrument,
    lots: &LotLedger,
    requested: Decimal,
    fee_percent: Option<Decimal>,
    row: &PriceRow,
) -> Result<Redemption, EngineError> {
    let available = lots.total();
    if requested > available {
        warn!(
            code = %instrument.code,
            date = %row.date,
            %requested,
            %available,
            "Redemption exceeds holding, clamping"
        );
    }
    let shares = requested.min(available).round_cents().min(available);
    if !shares.is_positive() {
        return Ok(Redemption {
            cash: Decimal::zero(),
            shares: Decimal::zero(),
            remaining: lots.copy(),
        });
    }

    let (sold, remaining) = lots.sell(shares)?;
    let cash = sold
        .iter()
        .map(|lot| {
            let percent = fee_percent.unwrap_or_else(|| {
                instrument
                    .fee_schedule
                    .resolve((row.date - lot.date).num_days())
            });
            let rate = Decimal::one() - percent / Decimal::hundred();
            (lot.shares * row.nav * rate).round_cents()
        })
        .sum();

    Ok(Redemption {
        cash,
        shares,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeeSchedule, InstrumentCode, PriceSeries};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, n).unwrap()
    }

    fn flat_instrument() -> Instrument {
        let rows = (1..=20)
            .map(|n| PriceRow::new(day(n), d("1.0")))
            .collect();
        Instrument::new(InstrumentCode::new("F1"), PriceSeries::new(rows).unwrap())
    }

    #[test]
    fn test_settle_purchase_charges_fee_on_top() {
        let instrument = flat_instrument().with_purchase_fee(d("1.5"));
        let row = PriceRow::new(day(1), d("2"));
        let (cash, shares) = settle_purchase(&instrument, d("1015"), None, &row);
        assert_eq!(cash, d("-1015"));
        assert_eq!(shares, d("500"));

        let (_, shares) = settle_purchase(&instrument, d("1000"), Some(Decimal::zero()), &row);
        assert_eq!(shares, d("500"));
    }

    #[test]
    fn test_settle_redemption_fee_per_lot() {
        let instrument = flat_instrument().with_fee_schedule(FeeSchedule::default_schedule());
        let lots = LotLedger::new().buy(d("100"), day(1)).buy(d("100"), day(8));
        let row = PriceRow::new(day(10), d("1"));

        let redemption = settle_redemption(&instrument, &lots, d("150"), None, &row).unwrap();
        // 100 held 9 days pay nothing, 50 held 2 days pay 1.5%
        assert_eq!(redemption.cash, d("100") + d("49.25"));
        assert_eq!(redemption.shares, d("150"));
        assert_eq!(redemption.remaining.total(), d("50"));
    }

    #[test]
    fn test_settle_redemption_clamps_to_holding() {
        let instrument = flat_instrument();
        let lots = LotLedger::new().buy(d("10"), day(1));
        let row = PriceRow::new(day(5), d("1"));
        let redemption = settle_redemption(&instrument, &lots, d("25"), None, &row).unwrap();
        assert_eq!(redemption.shares, d("10"));
        assert!(redemption.remaining.is_empty());
    }

    #[test]
    fn test_resume_rejects_misaligned_tables() {
        let instrument = Arc::new(flat_instrument());
        let ledger = TransactionLedger::new(instrument.code.clone(), vec![]);
        let cashflow =
            CashFlowTable::from_rows(vec![CashFlowRow::new(day(1), d("-10"), d("10"))]).unwrap();
        let result = TradeEngine::resume(
            instrument,
            ledger,
            cashflow,
            LotTable::new(),
            day(20),
        );
        assert!(matches!(result, Err(EngineError::InvalidSeed(_))));
    }

    #[test]
    fn test_empty_ledger_is_exhausted_immediately() {
        let instrument = Arc::new(flat_instrument());
        let ledger = TransactionLedger::new(instrument.code.clone(), vec![]);
        let mut engine = TradeEngine::new(instrument, ledger, day(20));
        assert_eq!(engine.advance().unwrap(), Step::Exhausted);
    }

    #[test]
    fn test_records_reaching_same_trading_day_share_a_row() {
        let rows = vec![
            PriceRow::new(day(3), d("1")),
            PriceRow::new(day(6), d("1")),
        ];
        let instrument = Arc::new(Instrument::new(
            InstrumentCode::new("F2"),
            PriceSeries::new(rows).unwrap(),
        ));
        let ledger = TransactionLedger::new(
            instrument.code.clone(),
            vec![
                LedgerEntry::new(day(1), d("100")),
                LedgerEntry::new(day(4), d("50")),
                LedgerEntry::new(day(5), d("-30")),
            ],
        );
        let trade = TradeEngine::new(instrument, ledger, day(6)).run().unwrap();
        let rows = trade.cashflow().rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].date, day(6));
        assert_eq!(rows[1].cash, d("-20"));
        assert_eq!(rows[1].share, d("20"));
    }
}
