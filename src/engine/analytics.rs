//! Performance metrics over a reconstructed cash-flow table.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{CashFlowRow, Decimal};
use crate::engine::EngineError;

const DAYS_PER_YEAR: f64 = 365.0;
const NEWTON_MAX_ITERATIONS: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-10;
const BISECTION_MAX_ITERATIONS: usize = 300;
/// Rates sampled to bracket a root when Newton's method fails.
const BRACKET_GRID: [f64; 15] = [
    -0.9999, -0.99, -0.9, -0.5, -0.2, 0.0, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 100.0, 1000.0, 1e4,
];

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("xirr did not converge from guess {guess}")]
    NonConvergence { guess: f64 },
    #[error("xirr needs both inflows and outflows")]
    DegenerateCashFlow,
    #[error(transparent)]
    Valuation(#[from] EngineError),
}

/// Peak capital deployed: the largest cumulative net outflow over all prefixes.
pub fn bottleneck(rows: &[CashFlowRow]) -> Decimal {
    let mut invested = Decimal::zero();
    let mut peak = Decimal::zero();
    for row in rows {
        invested = invested - row.cash;
        peak = peak.max(invested);
    }
    peak.round_cents()
}

/// Annualized turnover: traded volume over twice the bottleneck, per year held.
pub fn turnover_rate(rows: &[CashFlowRow], as_of: NaiveDate) -> Decimal {
    let Some(first) = rows.first() else {
        return Decimal::zero();
    };
    let days = (as_of - first.date).num_days();
    let peak = bottleneck(rows);
    if days <= 0 || peak.is_zero() {
        return Decimal::zero();
    }
    let volume: Decimal = rows.iter().map(|row| row.cash.abs()).sum();
    volume / peak / Decimal::from_i64(2) * Decimal::from_i64(365) / Decimal::from_i64(days)
}

/// Net money put in per share currently held.
pub fn unit_cost(rows: &[CashFlowRow], current_shares: Decimal) -> Decimal {
    if !current_shares.is_positive() {
        return Decimal::zero();
    }
    let net_input: Decimal = rows.iter().map(|row| -row.cash).sum();
    net_input.round_cents() / current_shares
}

/// Present value of dated flows at annual `rate`, discounted to the earliest date.
pub fn xnpv(rate: f64, flows: &[(NaiveDate, f64)]) -> f64 {
    let Some(t0) = flows.iter().map(|(date, _)| *date).min() else {
        return 0.0;
    };
    flows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - t0).num_days() as f64 / DAYS_PER_YEAR;
            amount / (1.0 + rate).powf(years)
        })
        .sum()
}

fn xnpv_derivative(rate: f64, flows: &[(NaiveDate, f64)], t0: NaiveDate) -> f64 {
    flows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - t0).num_days() as f64 / DAYS_PER_YEAR;
            -years * amount / (1.0 + rate).powf(years + 1.0)
        })
        .sum()
}

/// Annual rate at which the dated flows have zero present value.
///
/// Newton's method from `guess`; when it diverges or stalls, the root is
/// bracketed on a fixed grid of rates and bisected.
pub fn xirr(flows: &[(NaiveDate, f64)], guess: f64) -> Result<f64, AnalyticsError> {
    let has_inflow = flows.iter().any(|(_, amount)| *amount > 0.0);
    let has_outflow = flows.iter().any(|(_, amount)| *amount < 0.0);
    if !has_inflow || !has_outflow {
        return Err(AnalyticsError::DegenerateCashFlow);
    }
    let t0 = flows
        .iter()
        .map(|(date, _)| *date)
        .min()
        .ok_or(AnalyticsError::DegenerateCashFlow)?;

    if let Some(rate) = newton(flows, t0, guess) {
        return Ok(rate);
    }
    tracing::debug!(guess, "Newton iteration failed for xirr, bisecting");
    bisect(flows).ok_or(AnalyticsError::NonConvergence { guess })
}

fn newton(flows: &[(NaiveDate, f64)], t0: NaiveDate, guess: f64) -> Option<f64> {
    let mut rate = guess;
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let value = xnpv(rate, flows);
        let slope = xnpv_derivative(rate, flows, t0);
        if !slope.is_finite() || slope.abs() < f64::EPSILON {
            return None;
        }
        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() < NEWTON_TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisect(flows: &[(NaiveDate, f64)]) -> Option<f64> {
    let (mut lo, mut hi) = BRACKET_GRID
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .find(|(a, b)| xnpv(*a, flows).signum() != xnpv(*b, flows).signum())?;
    let mut f_lo = xnpv(lo, flows);
    for _ in 0..BISECTION_MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = xnpv(mid, flows);
        if f_mid == 0.0 || (hi - lo) < NEWTON_TOLERANCE {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}
