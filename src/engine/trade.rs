//! A reconstructed holding and the reports computed from it.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{CashFlowTable, Decimal, Instrument, InstrumentCode, LotTable};
use crate::engine::analytics::{self, AnalyticsError};
use crate::engine::reconstruction::{settle_redemption, EngineError};

/// Position snapshot on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BriefReport {
    pub date: NaiveDate,
    pub code: InstrumentCode,
    pub name: String,
    pub unit_value: Decimal,
    pub current_share: Decimal,
    pub current_value: Decimal,
}

/// Cumulative performance of the holding up to one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub code: InstrumentCode,
    pub name: String,
    pub unit_value: Decimal,
    pub unit_cost: Decimal,
    pub current_share: Decimal,
    pub current_cash: Decimal,
    pub total_input: Decimal,
    pub total_output: Decimal,
    pub absolute_return: Decimal,
    /// Percent of the bottleneck.
    pub return_rate: Decimal,
    pub bottleneck: Decimal,
    pub turnover: Decimal,
}

#[derive(Debug, Clone)]
pub struct Trade {
    instrument: Arc<Instrument>,
    cashflow: CashFlowTable,
    lots: LotTable,
}

impl Trade {
    pub fn new(instrument: Arc<Instrument>, cashflow: CashFlowTable, lots: LotTable) -> Self {
        Self {
            instrument,
            cashflow,
            lots,
        }
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn code(&self) -> &InstrumentCode {
        &self.instrument.code
    }

    pub fn cashflow(&self) -> &CashFlowTable {
        &self.cashflow
    }

    pub fn lots(&self) -> &LotTable {
        &self.lots
    }

    /// NAV of the last trading day on or before `date`, zero before listing.
    pub fn net_value(&self, date: NaiveDate) -> Decimal {
        self.instrument
            .prices
            .nav_on_or_before(date)
            .unwrap_or_else(Decimal::zero)
    }

    pub fn shares_on(&self, date: NaiveDate) -> Decimal {
        self.cashflow.shares_through(date)
    }

    /// None before the first event.
    pub fn brief_daily_report(&self, date: NaiveDate) -> Option<BriefReport> {
        if self.cashflow.through(date).is_empty() {
            return None;
        }
        let unit_value = self.net_value(date);
        let current_share = self.shares_on(date).round_cents();
        Some(BriefReport {
            date,
            code: self.instrument.code.clone(),
            name: self.instrument.name.clone(),
            unit_value,
            current_share,
            current_value: (current_share * unit_value).round_cents(),
        })
    }

    pub fn daily_report(&self, date: NaiveDate) -> DailyReport {
        let rows = self.cashflow.through(date);
        let unit_value = self.net_value(date);
        let current_share = self.shares_on(date).round_cents();
        let current_cash = (current_share * unit_value).round_cents();

        let total_input: Decimal = rows
            .iter()
            .filter(|row| row.cash.is_negative())
            .map(|row| -row.cash)
            .sum();
        let total_output: Decimal = rows
            .iter()
            .filter(|row| row.cash.is_positive())
            .map(|row| row.cash)
            .sum();
        let total_input = total_input.round_cents();
        let total_output = total_output.round_cents();

        let bottleneck = analytics::bottleneck(rows);
        let absolute_return = (current_cash + total_output - total_input).round_cents();
        let return_rate = if bottleneck.is_zero() {
            Decimal::zero()
        } else {
            (absolute_return / bottleneck * Decimal::hundred()).round_half_up(4)
        };

        DailyReport {
            date,
            code: self.instrument.code.clone(),
            name: self.instrument.name.clone(),
            unit_value,
            unit_cost: analytics::unit_cost(rows, current_share).round_half_up(4),
            current_share,
            current_cash,
            total_input,
            total_output,
            absolute_return,
            return_rate,
            bottleneck,
            turnover: analytics::turnover_rate(rows, date).round_half_up(4),
        }
    }

    pub fn unit_cost(&self, date: NaiveDate) -> Decimal {
        analytics::unit_cost(self.cashflow.through(date), self.shares_on(date))
    }

    /// Cash received if the whole holding were redeemed on `date`, fees included.
    pub fn liquidation_value(&self, date: NaiveDate) -> Result<Decimal, EngineError> {
        let shares = self.shares_on(date);
        if !shares.is_positive() {
            return Ok(Decimal::zero());
        }
        let row = self
            .instrument
            .prices
            .snap(date)
            .ok_or_else(|| EngineError::MissingPrice {
                code: self.instrument.code.to_string(),
                date,
            })?;
        let lots = self.lots.as_of(date);
        Ok(settle_redemption(&self.instrument, &lots, shares, None, row)?.cash)
    }

    /// Value of the holding at `date` used as an opening flow, fees ignored.
    pub fn market_value(&self, date: NaiveDate) -> Decimal {
        self.brief_daily_report(date)
            .map(|report| report.current_value)
            .unwrap_or_else(Decimal::zero)
    }

    /// Dated flows for an internal rate of return ending on `date`.
    ///
    /// With `start`, flows on or before it collapse into one opening outflow of
    /// the holding's market value on that day.
    pub fn rate_flows(
        &self,
        date: NaiveDate,
        start: Option<NaiveDate>,
    ) -> Result<Vec<(NaiveDate, f64)>, EngineError> {
        let rows = self.cashflow.through(date);
        let mut flows = Vec::with_capacity(rows.len() + 2);
        match start {
            Some(start) => {
                let opening = self.market_value(start);
                if opening.is_positive() {
                    flows.push((start, -opening.to_f64()));
                }
                flows.extend(
                    rows.iter()
                        .filter(|row| row.date > start)
                        .map(|row| (row.date, row.cash.to_f64())),
                );
            }
            None => flows.extend(rows.iter().map(|row| (row.date, row.cash.to_f64()))),
        }
        if !flows.is_empty() {
            flows.push((date, self.liquidation_value(date)?.to_f64()));
        }
        Ok(flows)
    }

    /// Annualized internal rate of return through `date`; zero with no flows.
    pub fn xirr_rate(
        &self,
        date: NaiveDate,
        start: Option<NaiveDate>,
        guess: f64,
    ) -> Result<f64, AnalyticsError> {
        let flows = self.rate_flows(date, start)?;
        if flows.is_empty() {
            return Ok(0.0);
        }
        analytics::xirr(&flows, guess)
    }
}
