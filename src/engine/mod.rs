//! Pure computation: trade reconstruction and performance analytics.

pub mod analytics;
pub mod reconstruction;
pub mod trade;

pub use analytics::{bottleneck, turnover_rate, unit_cost, xirr, xnpv, AnalyticsError};
pub use reconstruction::{
    settle_purchase, settle_redemption, EngineError, Redemption, Step, TradeEngine,
};
pub use trade::{BriefReport, DailyReport, Trade};
