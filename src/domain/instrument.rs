//! A traded fund: price history plus the terms trades are settled on.

use crate::domain::{
    DividendMode, FeeSchedule, InstrumentCode, Decimal, PriceSeries, ShareRounding,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub code: InstrumentCode,
    pub name: String,
    /// Purchase fee in percent, charged on top of the net amount invested.
    pub purchase_fee_percent: Decimal,
    /// Redemption fee by holding duration.
    pub fee_schedule: FeeSchedule,
    pub dividend_mode: DividendMode,
    pub share_rounding: ShareRounding,
    pub prices: PriceSeries,
}

impl Instrument {
    /// No purchase fee, no redemption fee, cash dividends, half-up shares.
    pub fn new(code: InstrumentCode, prices: PriceSeries) -> Self {
        Self {
            name: code.to_string(),
            code,
            purchase_fee_percent: Decimal::zero(),
            fee_schedule: FeeSchedule::free(),
            dividend_mode: DividendMode::Cash,
            share_rounding: ShareRounding::HalfUp,
            prices,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_purchase_fee(mut self, percent: Decimal) -> Self {
        self.purchase_fee_percent = percent;
        self
    }

    pub fn with_fee_schedule(mut self, schedule: FeeSchedule) -> Self {
        self.fee_schedule = schedule;
        self
    }

    pub fn with_dividend_mode(mut self, mode: DividendMode) -> Self {
        self.dividend_mode = mode;
        self
    }

    pub fn with_share_rounding(mut self, rounding: ShareRounding) -> Self {
        self.share_rounding = rounding;
        self
    }
}
