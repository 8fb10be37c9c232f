pub mod compile;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use compile::{CompileState, Compiler};
pub use config::Config;
pub use datasource::{
    CsvPriceProvider, DataSourceError, InMemoryPriceProvider, PriceProvider, RecordBook,
};
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, FeeSchedule, Instrument, InstrumentCode, LotLedger, PriceRow, PriceSeries,
    TransactionLedger,
};
pub use engine::{EngineError, Trade, TradeEngine};
pub use error::AppError;
pub use orchestration::{Orchestrator, Portfolio};
