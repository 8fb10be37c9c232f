//! Aggregation across funds: combined holdings, cash flows and return.

use crate::datasource::{PriceProvider, RecordBook};
use crate::domain::{Decimal, Instrument, InstrumentCode, TransactionLedger};
use crate::engine::{
    analytics, AnalyticsError, BriefReport, DailyReport, EngineError, Trade, TradeEngine,
};
use crate::orchestration::FundFailure;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One fund's line in a [`PortfolioSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    #[serde(flatten)]
    pub report: BriefReport,
    /// Share of the portfolio's current value, in percent.
    pub weight_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub date: NaiveDate,
    pub holdings: Vec<Holding>,
    pub total_value: Decimal,
}

/// One fund's full report with its own rate of return.
#[derive(Debug, Clone, Serialize)]
pub struct FundReport {
    #[serde(flatten)]
    pub daily: DailyReport,
    pub xirr: f64,
}

/// Everything printed for a reporting date.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub summary: PortfolioSummary,
    pub funds: Vec<FundReport>,
    pub xirr: f64,
    /// Funds left out, with the reason.
    pub failures: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct Portfolio {
    trades: BTreeMap<InstrumentCode, Trade>,
    failures: BTreeMap<InstrumentCode, FundFailure>,
}

/// Drop price rows after the horizon; they are not settled yet.
pub(crate) fn prepare_instrument(mut instrument: Instrument, horizon: NaiveDate) -> Arc<Instrument> {
    instrument.prices = instrument.prices.through(horizon);
    Arc::new(instrument)
}

fn reconstruct(
    instrument: Instrument,
    ledger: &TransactionLedger,
    horizon: NaiveDate,
) -> Result<Trade, EngineError> {
    TradeEngine::new(prepare_instrument(instrument, horizon), ledger.clone(), horizon).run()
}

fn merge_cashflows<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Vec<(NaiveDate, Decimal)> {
    let mut merged: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for trade in trades {
        for row in trade.cashflow().rows() {
            *merged.entry(row.date).or_insert_with(Decimal::zero) += row.cash;
        }
    }
    merged.into_iter().collect()
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct every fund in `records`. Price loads run concurrently.
    pub async fn build(
        provider: &dyn PriceProvider,
        records: &RecordBook,
        horizon: NaiveDate,
    ) -> Self {
        let loads = records.ledgers().map(|ledger| async move {
            let instrument = provider.instrument(ledger.code()).await;
            (ledger, instrument)
        });

        let mut portfolio = Self::new();
        for (ledger, instrument) in join_all(loads).await {
            let result = instrument
                .map_err(FundFailure::from)
                .and_then(|instrument| Ok(reconstruct(instrument, ledger, horizon)?));
            portfolio.record(ledger.code().clone(), result);
        }
        info!(
            funds = portfolio.trades.len(),
            failed = portfolio.failures.len(),
            "Portfolio built"
        );
        portfolio
    }

    /// Add a fund's outcome; failures are logged and kept for inspection.
    pub fn record(&mut self, code: InstrumentCode, result: Result<Trade, FundFailure>) {
        match result {
            Ok(trade) => {
                self.failures.remove(&code);
                self.trades.insert(code, trade);
            }
            Err(err) => {
                warn!(%code, error = %err, "Fund excluded from portfolio");
                self.trades.remove(&code);
                self.failures.insert(code, err);
            }
        }
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }

    pub fn trade(&self, code: &InstrumentCode) -> Option<&Trade> {
        self.trades.get(code)
    }

    pub fn failures(&self) -> &BTreeMap<InstrumentCode, FundFailure> {
        &self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Holdings on `date`, largest position first.
    pub fn summary(&self, date: NaiveDate) -> PortfolioSummary {
        let reports: Vec<BriefReport> = self
            .trades
            .values()
            .filter_map(|trade| trade.brief_daily_report(date))
            .collect();
        let total_value: Decimal = reports.iter().map(|r| r.current_value).sum();

        let mut holdings: Vec<Holding> = reports
            .into_iter()
            .map(|report| {
                let weight_percent = if total_value.is_positive() {
                    (report.current_value / total_value * Decimal::hundred()).round_cents()
                } else {
                    Decimal::zero()
                };
                Holding {
                    report,
                    weight_percent,
                }
            })
            .collect();
        holdings.sort_by(|a, b| {
            b.report
                .current_value
                .cmp(&a.report.current_value)
                .then_with(|| a.report.code.cmp(&b.report.code))
        });

        PortfolioSummary {
            date,
            holdings,
            total_value: total_value.round_cents(),
        }
    }

    /// Net cash per date across all funds.
    pub fn combined_cashflow(&self) -> Vec<(NaiveDate, Decimal)> {
        merge_cashflows(self.trades.values())
    }

    /// Internal rate of return of the whole portfolio through `date`.
    ///
    /// The terminal flow is the sum of every fund's liquidation value. A fund
    /// that cannot be valued is left out along with its cash flows.
    pub fn xirr(&self, date: NaiveDate, guess: f64) -> Result<f64, AnalyticsError> {
        let mut valued = Vec::with_capacity(self.trades.len());
        let mut terminal = Decimal::zero();
        for trade in self.trades.values() {
            match trade.liquidation_value(date) {
                Ok(value) => {
                    terminal += value;
                    valued.push(trade);
                }
                Err(err) => warn!(
                    code = %trade.code(),
                    %date,
                    error = %err,
                    "Fund left out of portfolio xirr"
                ),
            }
        }

        let mut flows: Vec<(NaiveDate, f64)> = merge_cashflows(valued)
            .into_iter()
            .filter(|(day, _)| *day <= date)
            .map(|(day, cash)| (day, cash.to_f64()))
            .collect();
        if flows.is_empty() {
            return Ok(0.0);
        }
        flows.push((date, terminal.to_f64()));
        analytics::xirr(&flows, guess)
    }

    /// [`Portfolio::xirr`], with 0.0 substituted when it cannot be computed.
    pub fn xirr_or_zero(&self, date: NaiveDate, guess: f64) -> f64 {
        match self.xirr(date, guess) {
            Ok(rate) => rate,
            Err(err) => {
                warn!(%date, error = %err, "Portfolio xirr unavailable, reporting 0");
                0.0
            }
        }
    }

    pub fn report(&self, date: NaiveDate, guess: f64) -> PortfolioReport {
        let funds = self
            .trades
            .values()
            .filter(|trade| !trade.cashflow().through(date).is_empty())
            .map(|trade| {
                let xirr = trade.xirr_rate(date, None, guess).unwrap_or_else(|err| {
                    warn!(
                        code = %trade.code(),
                        %date,
                        error = %err,
                        "Fund xirr unavailable, reporting 0"
                    );
                    0.0
                });
                FundReport {
                    daily: trade.daily_report(date),
                    xirr,
                }
            })
            .collect();

        PortfolioReport {
            summary: self.summary(date),
            funds,
            xirr: self.xirr_or_zero(date, guess),
            failures: self
                .failures
                .iter()
                .map(|(code, err)| (code.to_string(), err.to_string()))
                .collect(),
        }
    }
}
