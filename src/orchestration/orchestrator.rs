use crate::compile::{CompileOutcome, Compiler};
use crate::datasource::{PriceProvider, RecordBook};
use crate::db::Repository;
use crate::domain::TransactionLedger;
use crate::orchestration::portfolio::{prepare_instrument, Portfolio};
use crate::orchestration::FundFailure;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

/// Loads prices and compiles funds against the persistent store.
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn PriceProvider>,
    repo: Arc<Repository>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn PriceProvider>, repo: Arc<Repository>) -> Self {
        Self { provider, repo }
    }

    /// Compile one fund up to `horizon`, reusing its stored prefix when possible.
    pub async fn compile_fund(
        &self,
        ledger: &TransactionLedger,
        horizon: NaiveDate,
    ) -> Result<CompileOutcome, FundFailure> {
        let instrument = self.provider.instrument(ledger.code()).await?;
        let instrument = prepare_instrument(instrument, horizon);
        Ok(Compiler::compile_incremental(&self.repo, instrument, ledger, horizon).await?)
    }

    /// Compile every fund in `records`. Funds are compiled one at a time so
    /// writes to the store never interleave.
    pub async fn compile_all(&self, records: &RecordBook, horizon: NaiveDate) -> Portfolio {
        let mut portfolio = Portfolio::new();
        let mut appended = 0;
        for ledger in records.ledgers() {
            let result = self.compile_fund(ledger, horizon).await.map(|outcome| {
                appended += outcome.appended;
                outcome.trade
            });
            portfolio.record(ledger.code().clone(), result);
        }
        info!(
            funds = records.len(),
            failed = portfolio.failures().len(),
            appended,
            %horizon,
            "Compile pass finished"
        );
        portfolio
    }
}
