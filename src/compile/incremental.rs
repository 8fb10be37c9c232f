//! Incremental reconstruction: resume the trade engine from stored rows and
//! persist only what it appends.

use crate::compile::CompileState;
use crate::db::Repository;
use crate::domain::{CashFlowTable, Instrument, LotTable, TransactionLedger};
use crate::engine::{EngineError, Trade, TradeEngine};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What one compile run did.
#[derive(Debug)]
pub struct CompileOutcome {
    pub trade: Trade,
    /// Rows appended by this run.
    pub appended: usize,
    /// Whether stored rows were discarded and rebuilt from scratch.
    pub rebuilt: bool,
}

/// Fingerprint of every input a reconstruction prefix through `through` depends on:
/// the records, the fund's settlement terms and the price rows up to that date.
pub fn prefix_digest(
    instrument: &Instrument,
    ledger: &TransactionLedger,
    through: NaiveDate,
) -> Result<String, serde_json::Error> {
    let terms = serde_json::json!({
        "purchase_fee_percent": instrument.purchase_fee_percent,
        "fee_schedule": instrument.fee_schedule,
        "dividend_mode": instrument.dividend_mode,
        "share_rounding": instrument.share_rounding,
    });
    let prices = instrument.prices.through(through);

    let mut hasher = Sha256::new();
    hasher.update(ledger.digest_through(through));
    hasher.update(serde_json::to_vec(&terms)?);
    hasher.update(serde_json::to_vec(prices.rows())?);
    Ok(hex::encode(hasher.finalize()))
}

/// Compiler for incremental trade reconstruction.
pub struct Compiler;

impl Compiler {
    /// Bring the stored tables of one fund up to `horizon`.
    ///
    /// Stored rows are reused when their prefix digest still matches; otherwise
    /// they are cleared and the fund is rebuilt. New rows and the watermark are
    /// written in one transaction.
    ///
    /// # Errors
    /// Returns an error if database operations fail or the engine rejects the ledger.
    pub async fn compile_incremental(
        repo: &Repository,
        instrument: Arc<Instrument>,
        ledger: &TransactionLedger,
        horizon: NaiveDate,
    ) -> Result<CompileOutcome, CompileError> {
        let code = instrument.code.clone();
        let stored = repo.get_compile_state(&code).await?;

        let prefix = match &stored {
            Some(state) => Self::reusable_prefix(repo, state, &instrument, ledger, horizon).await?,
            None => None,
        };
        let rebuilt = stored.is_some() && prefix.is_none();

        let (mut engine, start_rows) = match (prefix, stored) {
            (Some((cashflow, lots)), Some(state)) => {
                let start_rows = cashflow.len();
                let mut engine = TradeEngine::resume(
                    instrument.clone(),
                    ledger.clone(),
                    cashflow,
                    lots,
                    horizon,
                )?;
                if let Some(through) = state.processed_through {
                    engine = engine.with_processed_through(through);
                }
                debug!(%code, rows = start_rows, "Resuming from stored prefix");
                (engine, start_rows)
            }
            _ => {
                if rebuilt {
                    info!(%code, "Stored rows are stale, rebuilding");
                    repo.clear_instrument(&code).await?;
                }
                let engine = TradeEngine::new(instrument.clone(), ledger.clone(), horizon);
                (engine, 0)
            }
        };

        while let Some(date) = engine.advance()?.date() {
            debug!(%code, %date, "Applied event day");
        }

        let processed_through = engine.processed_through();
        let write_from = engine
            .amended_from()
            .map_or(start_rows, |index| index.min(start_rows));
        let trade = engine.into_trade();
        let cashflow = trade.cashflow().rows();
        let lots = trade.lots().rows();
        let appended = cashflow.len() - start_rows;

        let mut state = CompileState::new(code.clone());
        if let Some(through) = processed_through {
            state.update_watermark(
                cashflow.last().map(|row| row.date),
                Some(through),
                prefix_digest(&instrument, ledger, through)?,
                cashflow.len() as i64,
            );
        }
        // Amended stored rows are rewritten in place by sequence number.
        if write_from < cashflow.len() || rebuilt {
            repo.append_trade_rows(&state, &cashflow[write_from..], &lots[write_from..])
                .await?;
        }

        info!(%code, appended, rebuilt, rows = cashflow.len(), "Compiled fund");
        Ok(CompileOutcome {
            trade,
            appended,
            rebuilt,
        })
    }

    /// Stored tables, if they were built from the same inputs and still
    /// describe a prefix of the run up to `horizon`.
    async fn reusable_prefix(
        repo: &Repository,
        state: &CompileState,
        instrument: &Instrument,
        ledger: &TransactionLedger,
        horizon: NaiveDate,
    ) -> Result<Option<(CashFlowTable, LotTable)>, CompileError> {
        let Some(through) = state.processed_through else {
            return Ok(None);
        };
        if through > horizon || state.ends_on_backfilled_row() {
            return Ok(None);
        }
        let digest = prefix_digest(instrument, ledger, through)?;
        if state.prefix_digest.as_deref() != Some(digest.as_str()) {
            return Ok(None);
        }
        let (cashflow, lots) = repo.load_trade_tables(&state.code).await?;
        let expected = state.row_count as usize;
        if cashflow.len() != expected || lots.len() != expected {
            return Ok(None);
        }
        Ok(Some((cashflow, lots)))
    }
}
