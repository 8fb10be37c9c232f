//! Multi-fund orchestration: loading, reconstruction and aggregation.
//!
//! A failure in one fund is recorded against its code and never aborts the others.

pub mod orchestrator;
pub mod portfolio;

pub use orchestrator::Orchestrator;
pub use portfolio::{FundReport, Holding, Portfolio, PortfolioReport, PortfolioSummary};

use crate::compile::CompileError;
use crate::datasource::DataSourceError;
use crate::engine::EngineError;
use thiserror::Error;

/// Why one fund is missing from a portfolio.
#[derive(Debug, Error)]
pub enum FundFailure {
    #[error("price data: {0}")]
    Provider(#[from] DataSourceError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}
