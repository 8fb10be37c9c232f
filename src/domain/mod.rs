//! Domain types for fund trade reconstruction.
//!
//! This module provides:
//! - Exact decimal amounts with the ledger's rounding convention
//! - Fee schedules, purchase lots, price series and instruments
//! - Transaction records and the legacy quantity decoding
//! - The reconstructed cash-flow and lot tables

pub mod cashflow;
pub mod decimal;
pub mod fee;
pub mod instrument;
pub mod lot;
pub mod price;
pub mod primitives;
pub mod transaction;

pub use cashflow::{CashFlowRow, CashFlowTable, LotTable, LotTableRow};
pub use decimal::Decimal;
pub use fee::{FeeSchedule, FeeScheduleError, FeeSegment};
pub use instrument::Instrument;
pub use lot::{Lot, LotError, LotLedger};
pub use price::{CorporateAction, PriceRow, PriceSeries, PriceSeriesError};
pub use primitives::{parse_date, DividendMode, InstrumentCode, ShareRounding};
pub use transaction::{LedgerEntry, TradeAction, TransactionLedger};
